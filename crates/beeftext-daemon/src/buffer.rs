//! Typing buffer: the last few characters typed

use std::collections::VecDeque;

/// Characters kept beyond the longest trigger: the one before it (word
/// boundary check) and the one after it (delimiter).
pub const BUFFER_MARGIN: usize = 2;

/// Rolling, bounded view of the text left of the caret.
#[derive(Debug, Clone)]
pub struct TypingBuffer {
    chars: VecDeque<char>,
    capacity: usize,
    generation: u64,
}

impl TypingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            chars: VecDeque::with_capacity(capacity),
            capacity,
            generation: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the bound, evicting the oldest characters if needed.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.evict();
    }

    fn evict(&mut self) {
        while self.chars.len() > self.capacity {
            self.chars.pop_front();
        }
    }

    pub fn append(&mut self, c: char) {
        if self.capacity == 0 {
            return;
        }
        self.chars.push_back(c);
        self.evict();
    }

    pub fn append_str(&mut self, text: &str) {
        for c in text.chars() {
            self.append(c);
        }
    }

    /// Remove the last character; no-op when empty.
    pub fn append_backspace(&mut self) {
        self.chars.pop_back();
    }

    pub fn reset(&mut self) {
        self.chars.clear();
    }

    pub fn snapshot(&self) -> Vec<char> {
        self.chars.iter().copied().collect()
    }

    /// Contiguous view for matching, without copying.
    pub fn as_slice(&mut self) -> &[char] {
        self.chars.make_contiguous()
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Count of user keystrokes applied so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn bump_generation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}

impl std::fmt::Display for TypingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for c in &self.chars {
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}
