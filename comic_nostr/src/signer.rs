//! A [`Signer`] that asks an external program, one process per request.
//!
//! The program reads one JSON request from stdin:
//!
//! ```json
//! {"method":"getPublicKey"}
//! {"method":"signEvent","params":{"pubkey":"…","created_at":1,"kind":1,"tags":[],"content":""}}
//! ```
//!
//! and answers on stdout with `{"result": …}` or `{"error": "…"}`.

use std::process::Stdio;

use comic_core::{Event, Signer, SignerError, UnsignedEvent};
use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct CommandSigner {
    program: String,
    args: Vec<String>,
}

impl CommandSigner {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `[program, args...]` as written in the config file.
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }

    async fn call(&self, request: Value) -> Result<Value, SignerError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => SignerError::Unavailable,
                _ => SignerError::Io(err),
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SignerError::Protocol("signer stdin unavailable".into()))?;
        stdin.write_all(request.to_string().as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        drop(stdin);

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(SignerError::Protocol(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let response: Value = serde_json::from_slice(&output.stdout)
            .map_err(|err| SignerError::Protocol(format!("unreadable signer response: {err}")))?;
        if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
            let message = error.as_str().map(str::to_string).unwrap_or_else(|| error.to_string());
            return Err(SignerError::Rejected(message));
        }
        response
            .get("result")
            .cloned()
            .ok_or_else(|| SignerError::Protocol("signer response has no result".into()))
    }
}

#[async_trait::async_trait]
impl Signer for CommandSigner {
    async fn get_public_key(&self) -> Result<String, SignerError> {
        let result = self.call(json!({"method": "getPublicKey"})).await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SignerError::Protocol(format!("public key is not a string: {result}")))
    }

    async fn sign_event(&self, event: UnsignedEvent) -> Result<Event, SignerError> {
        let params = serde_json::to_value(&event).map_err(|err| SignerError::Protocol(err.to_string()))?;
        let result = self
            .call(json!({"method": "signEvent", "params": params}))
            .await?;
        let signed: Event = serde_json::from_value(result)
            .map_err(|err| SignerError::Protocol(format!("signed event is malformed: {err}")))?;
        if !signed.verify_id() {
            return Err(SignerError::InvalidId);
        }
        Ok(signed)
    }
}
