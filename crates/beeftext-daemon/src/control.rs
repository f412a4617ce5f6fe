//! Control requests
//!
//! Maps each [`IpcRequest`] to an operation on the [`DaemonContext`]. Failures
//! come back as [`IpcResponse::Error`]; nothing here can stop the daemon.

use crate::context::DaemonContext;
use crate::ipc::{ComboSummary, IpcRequest, IpcResponse};

fn success(message: impl Into<String>) -> IpcResponse {
    IpcResponse::Success {
        message: Some(message.into()),
    }
}

fn error(message: impl Into<String>) -> IpcResponse {
    IpcResponse::Error {
        message: message.into(),
    }
}

fn state_word(enabled: bool) -> &'static str {
    if enabled {
        "enabled"
    } else {
        "disabled"
    }
}

pub fn handle_request(ctx: &DaemonContext, request: IpcRequest) -> IpcResponse {
    match request {
        IpcRequest::Status => IpcResponse::Status(ctx.status()),

        IpcRequest::Enable | IpcRequest::Disable => {
            let enabled = request == IpcRequest::Enable;
            if enabled && ctx.status().hook_error.is_some() {
                return error("Keyboard hook is not installed, substitution cannot run");
            }
            let was = ctx.set_enabled(enabled);
            if was == enabled {
                success(format!("Substitution already {}", state_word(enabled)))
            } else {
                success(format!("Substitution {}", state_word(enabled)))
            }
        }

        IpcRequest::Reload => match ctx.reload() {
            Ok(count) => success(format!("Reloaded {} combos", count)),
            Err(message) => error(message),
        },

        IpcRequest::ListCombos => {
            let combos = ctx.with_combos(|manager| {
                let list = manager.list();
                list.combos
                    .iter()
                    .map(|combo| ComboSummary {
                        id: combo.id.clone(),
                        keyword: combo.trigger.keyword.clone(),
                        name: combo.name.clone(),
                        group: combo.group.clone(),
                        enabled: combo.enabled,
                        active: list.is_active(combo),
                    })
                    .collect()
            });
            IpcResponse::Combos { combos }
        }

        IpcRequest::SetComboEnabled { id, enabled } => {
            match ctx.with_combos(|manager| manager.set_enabled(&id, enabled)) {
                Ok(()) => success(format!("Combo '{}' {}", id, state_word(enabled))),
                Err(e) => error(e.to_string()),
            }
        }

        IpcRequest::SetGroupEnabled { id, enabled } => {
            match ctx.with_combos(|manager| manager.set_group_enabled(&id, enabled)) {
                Ok(()) => success(format!("Group '{}' {}", id, state_word(enabled))),
                Err(e) => error(e.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::daemon_context;
    use tempfile::TempDir;

    const LIST: &str = r#"{
        "version": 1,
        "groups": [ { "id": "work", "name": "Work" } ],
        "combos": [
            { "id": "sig", "name": "Signature", "group": "work",
              "trigger": { "keyword": "::sig" }, "snippet": "Regards" },
            { "id": "btw", "trigger": { "keyword": "btw" }, "snippet": "by the way" }
        ]
    }"#;

    fn context_with_list(dir: &TempDir) -> DaemonContext {
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        std::fs::write(dir.path().join("data/comboList.json"), LIST).unwrap();
        daemon_context(dir)
    }

    fn message(response: IpcResponse) -> String {
        match response {
            IpcResponse::Success { message } => message.unwrap_or_default(),
            IpcResponse::Error { message } => format!("error: {}", message),
            other => panic!("Unexpected response {:?}", other),
        }
    }

    #[test]
    fn test_status() {
        let dir = TempDir::new().unwrap();
        let ctx = context_with_list(&dir);
        let IpcResponse::Status(status) = handle_request(&ctx, IpcRequest::Status) else {
            panic!("Expected status");
        };
        assert!(status.enabled);
        assert_eq!(status.total_combos, 2);
        assert_eq!(status.active_combos, 2);
        assert_eq!(status.combo_list, dir.path().join("data/comboList.json"));
    }

    #[test]
    fn test_enable_disable() {
        let dir = TempDir::new().unwrap();
        let ctx = context_with_list(&dir);
        assert_eq!(message(handle_request(&ctx, IpcRequest::Disable)), "Substitution disabled");
        assert!(!ctx.is_enabled());
        assert_eq!(
            message(handle_request(&ctx, IpcRequest::Disable)),
            "Substitution already disabled"
        );
        assert_eq!(message(handle_request(&ctx, IpcRequest::Enable)), "Substitution enabled");
    }

    #[test]
    fn test_enable_refused_without_hook() {
        let dir = TempDir::new().unwrap();
        let ctx = context_with_list(&dir);
        ctx.set_hook_failed("No keyboard found to listen to");
        assert!(message(handle_request(&ctx, IpcRequest::Enable)).starts_with("error:"));
        assert!(!ctx.is_enabled());
    }

    #[test]
    fn test_list_and_toggle_combos() {
        let dir = TempDir::new().unwrap();
        let ctx = context_with_list(&dir);

        let response = handle_request(
            &ctx,
            IpcRequest::SetGroupEnabled {
                id: "work".to_string(),
                enabled: false,
            },
        );
        assert_eq!(message(response), "Group 'work' disabled");

        let IpcResponse::Combos { combos } = handle_request(&ctx, IpcRequest::ListCombos) else {
            panic!("Expected combos");
        };
        let sig = combos.iter().find(|c| c.id == "sig").unwrap();
        assert!(sig.enabled);
        assert!(!sig.active);
        assert_eq!(sig.name.as_deref(), Some("Signature"));

        let response = handle_request(
            &ctx,
            IpcRequest::SetComboEnabled {
                id: "missing".to_string(),
                enabled: false,
            },
        );
        assert_eq!(message(response), "error: No combo with id 'missing'");
    }

    #[test]
    fn test_reload_keeps_dictionary_on_corrupt_list() {
        let dir = TempDir::new().unwrap();
        let ctx = context_with_list(&dir);
        std::fs::write(dir.path().join("data/comboList.json"), "{ not json").unwrap();

        let reply = message(handle_request(&ctx, IpcRequest::Reload));
        assert!(reply.starts_with("error: Combo list"), "{}", reply);
        let IpcResponse::Status(status) = handle_request(&ctx, IpcRequest::Status) else {
            panic!("Expected status");
        };
        assert_eq!(status.active_combos, 2);

        std::fs::write(dir.path().join("data/comboList.json"), LIST).unwrap();
        assert_eq!(message(handle_request(&ctx, IpcRequest::Reload)), "Reloaded 2 combos");
    }
}
