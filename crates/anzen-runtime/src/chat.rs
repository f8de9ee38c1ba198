// chat.rs — The chat-answer collaborator seam.
//
// Free-text questions never enter the plan pipeline. They go to the same
// kind of engine as drafts, tagged as chat requests, and come back as plain
// text.

use std::time::Duration;

use serde::Serialize;

use anzen_policy::{EngineConfig, EngineMode};

use crate::command;
use crate::error::CollaboratorError;

/// Anything that can answer a free-text question.
pub trait ChatAnswerClient: Send + Sync {
    fn answer(&self, text: &str) -> Result<String, CollaboratorError>;
}

#[derive(Debug, Clone)]
pub enum ChatEngine {
    /// A fixed reply, for offline use and tests.
    Scripted(String),
    /// An external command; stdout is the answer.
    Command {
        command: String,
        args: Vec<String>,
        timeout: Duration,
    },
    /// No chat engine configured.
    Disabled,
}

impl ChatEngine {
    pub fn from_config(engine: &EngineConfig) -> Self {
        match engine.mode {
            EngineMode::Command => ChatEngine::Command {
                command: engine.command.clone(),
                args: engine.args.clone(),
                timeout: Duration::from_secs(engine.timeout_seconds),
            },
            EngineMode::Scripted => ChatEngine::Disabled,
        }
    }
}

#[derive(Serialize)]
struct CommandChatRequest<'a> {
    kind: &'static str,
    text: &'a str,
}

impl ChatAnswerClient for ChatEngine {
    fn answer(&self, text: &str) -> Result<String, CollaboratorError> {
        match self {
            ChatEngine::Scripted(reply) => Ok(reply.clone()),
            ChatEngine::Command {
                command,
                args,
                timeout,
            } => {
                let input = serde_json::to_vec(&CommandChatRequest { kind: "chat", text }).map_err(|e| {
                    CollaboratorError::Malformed {
                        command: command.clone(),
                        reason: e.to_string(),
                    }
                })?;
                command::exchange(command, args, &input, *timeout)
            }
            ChatEngine::Disabled => Err(CollaboratorError::Unavailable("no chat engine configured".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_mode_disables_chat() {
        let config = EngineConfig {
            mode: EngineMode::Scripted,
            ..EngineConfig::default()
        };
        let err = ChatEngine::from_config(&config).answer("hi").unwrap_err();
        assert!(matches!(err, CollaboratorError::Unavailable(_)));
    }

    #[cfg(unix)]
    #[test]
    fn command_chat_returns_stdout() {
        let engine = ChatEngine::Command {
            command: "sh".into(),
            args: vec!["-c".into(), r#"grep -q '"kind":"chat"' && printf 'hello there'"#.into()],
            timeout: Duration::from_secs(5),
        };
        assert_eq!(engine.answer("hi").unwrap(), "hello there");
    }
}
