//! `hdh-relay send`: route a message or batch without running a server.
//!
//! Builds the same request the HTTP endpoints accept, routes it through a
//! [`Dispatcher`] with the loaded config and prints the result as JSON.
//! A result with `success: false` exits non-zero.

use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;

use dialoguer::Password;
use serde_json::Value;

use crate::cli::SendArgs;
use crate::config::Overrides;
use crate::error::{DispatchError, RelayError};
use crate::logging;
use crate::relay::dispatcher::Dispatcher;
use crate::relay::request::{BatchForm, MessageForm, RoutingRequest};
use crate::relay::transport::PooledTransport;
use crate::server;

use super::run;

pub async fn execute(args: SendArgs) -> Result<(), RelayError> {
    logging::init_stderr(&args.log_level);

    let overrides = Overrides {
        gateway_url: args.gateway_url.clone(),
        direct_timeout: None,
    };
    let source = run::resolve_source(args.config.as_deref()).await?;
    let (config, _) = run::load(source.as_ref(), &overrides).await?;

    let password = match args.password.clone() {
        Some(password) => password,
        None => prompt_password()?,
    };
    let request = build_request(&args, password).await?;

    let max_connections = config.direct.max_connections;
    let transport = PooledTransport::new(server::build_http_client(max_connections), max_connections);
    let correlation_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(correlation_id = %correlation_id, mode = request.mode(), "sending");

    let result = Dispatcher::new(Arc::new(transport), &config)
        .with_correlation_id(correlation_id)
        .route(request)
        .await?;

    let rendered = serde_json::to_string_pretty(&result)
        .map_err(|e| RelayError::InvalidInput(format!("unserializable result: {e}")))?;
    println!("{rendered}");

    if result.success {
        return Ok(());
    }
    let status = result.status.unwrap_or(500);
    Err(DispatchError::Upstream {
        status,
        message: result
            .error
            .unwrap_or_else(|| format!("Hub answered {status}")),
        response: result.data.unwrap_or(Value::Null),
    }
    .into())
}

fn prompt_password() -> Result<String, RelayError> {
    if !std::io::stdin().is_terminal() {
        return Err(RelayError::InvalidInput(
            "no password given: pass --password, set HDH_PASSWORD or run in a terminal".into(),
        ));
    }
    Password::new()
        .with_prompt("Hub password")
        .interact()
        .map_err(|e| RelayError::Io(std::io::Error::other(e.to_string())))
}

async fn build_request(args: &SendArgs, password: String) -> Result<RoutingRequest, RelayError> {
    if let Some(ref path) = args.batch {
        let payloads: Vec<Value> = serde_json::from_str(&read(path).await?).map_err(|e| {
            RelayError::InvalidInput(format!(
                "{} must hold a JSON array of payloads: {e}",
                path.display()
            ))
        })?;
        return Ok(BatchForm {
            domain: Some(args.domain.clone()),
            username: Some(args.username.clone()),
            password: Some(password),
            payloads: Some(payloads),
        }
        .into_request()?);
    }

    let content = match args.file {
        Some(ref path) => Some(Value::String(read(path).await?)),
        None => None,
    };
    Ok(MessageForm {
        message_type: args.message_type.clone(),
        content,
        domain: Some(args.domain.clone()),
        username: Some(args.username.clone()),
        password: Some(password),
        data_source_identifier: args.data_source.clone(),
    }
    .into_request()?)
}

async fn read(path: &Path) -> Result<String, RelayError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(RelayError::InvalidInput(
            format!("file not found: {}", path.display()),
        )),
        Err(e) => Err(RelayError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::cli::LogLevel;
    use crate::relay::request::MessageType;

    fn args() -> SendArgs {
        SendArgs {
            config: None,
            domain: "https://hub.example.com".into(),
            username: "lab".into(),
            password: None,
            message_type: None,
            file: None,
            data_source: None,
            batch: None,
            gateway_url: None,
            log_level: LogLevel::Warn,
        }
    }

    fn temp_file(content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("hdh-relay-send-{}", uuid::Uuid::new_v4()));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn message_file_becomes_content() {
        let file = temp_file("MSH|^~\\&|LAB\r");
        let request = build_request(
            &SendArgs {
                message_type: Some("HL7".into()),
                file: Some(file.clone()),
                data_source: Some("EHR7".into()),
                ..args()
            },
            "pw".into(),
        )
        .await
        .unwrap();
        std::fs::remove_file(file).unwrap();

        let RoutingRequest::ProcessMessage(message) = request else {
            panic!("expected a message");
        };
        assert_eq!(message.message_type, MessageType::Hl7);
        assert_eq!(message.content, "MSH|^~\\&|LAB\r");
        assert_eq!(message.credentials.password, "pw");
        assert_eq!(message.data_source_identifier.as_deref(), Some("EHR7"));
    }

    #[tokio::test]
    async fn batch_file_must_be_an_array() {
        let file = temp_file(r#"{"not": "an array"}"#);
        let err = build_request(
            &SendArgs {
                batch: Some(file.clone()),
                ..args()
            },
            "pw".into(),
        )
        .await
        .unwrap_err();
        std::fs::remove_file(file).unwrap();
        assert!(matches!(err, RelayError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn batch_file_becomes_payloads() {
        let file = temp_file(r#"[{"id": 1}, {"id": 2}]"#);
        let request = build_request(
            &SendArgs {
                batch: Some(file.clone()),
                ..args()
            },
            "pw".into(),
        )
        .await
        .unwrap();
        std::fs::remove_file(file).unwrap();

        let RoutingRequest::Proxy(batch) = request else {
            panic!("expected a batch");
        };
        assert_eq!(batch.payloads.len(), 2);
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let err = build_request(
            &SendArgs {
                message_type: Some("json".into()),
                file: Some(PathBuf::from("/nonexistent/hdh-relay/message.json")),
                ..args()
            },
            "pw".into(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("file not found"));
    }
}
