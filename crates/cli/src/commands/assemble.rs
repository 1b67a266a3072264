//! `ctxloom assemble` / `ctxloom inspect`: run one request through the
//! engine and print the response envelope.

use std::path::Path;
use std::sync::Arc;

use ctxloom_config::AppConfig;
use ctxloom_context::{ASSEMBLE_CHANNEL, ContextEngine, ContextRpc, INSPECT_CHANNEL};
use serde_json::Value;
use tracing::{debug, info};

use super::fixture::LayerFixture;

pub async fn run(
    config: &AppConfig,
    request: &Path,
    layers: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = execute(config, ASSEMBLE_CHANNEL, request, layers).await?;
    print_envelope(&response)
}

pub async fn inspect(
    config: &AppConfig,
    request: &Path,
    layers: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = execute(config, INSPECT_CHANNEL, request, layers).await?;
    print_envelope(&response)
}

/// Build an engine, apply the fixture, and dispatch the request file.
pub async fn execute(
    config: &AppConfig,
    channel: &str,
    request: &Path,
    layers: Option<&Path>,
) -> Result<Value, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(request)
        .map_err(|e| format!("Failed to read request file {}: {e}", request.display()))?;
    let payload: Value = serde_json::from_str(&content)
        .map_err(|e| format!("Request file {} is not valid JSON: {e}", request.display()))?;

    let mut engine = ContextEngine::from_config(config);
    if let Some(path) = layers {
        debug!(path = %path.display(), "Installing layer fixture");
        engine = LayerFixture::load(path)?.install(engine);
    }

    let rpc = ContextRpc::new(Arc::new(engine));
    let response = rpc.dispatch(channel, payload).await;
    let ok = response["ok"] == true;
    info!(channel, request = %request.display(), ok, "Request dispatched");
    Ok(response)
}

fn print_envelope(response: &Value) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(response)?);
    if response["ok"] != true {
        let code = response["error"]["code"].as_str().unwrap_or("UNKNOWN");
        return Err(format!("request failed with {code}").into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    const REQUEST: &str = r#"{"projectId":"project-1","documentId":"document-1",
        "cursorPosition":16,"skillId":"continue-writing"}"#;

    #[tokio::test]
    async fn assemble_request_file() {
        let dir = tempfile::tempdir().unwrap();
        let request = write_file(&dir, "request.json", REQUEST);

        let response = execute(&AppConfig::default(), ASSEMBLE_CHANNEL, &request, None)
            .await
            .unwrap();
        assert_eq!(response["ok"], true);
        assert!(
            response["data"]["prompt"]
                .as_str()
                .unwrap()
                .ends_with("## Immediate\ncursor=16")
        );
    }

    #[tokio::test]
    async fn scope_violation_from_fixture() {
        let dir = tempfile::tempdir().unwrap();
        let request = write_file(&dir, "request.json", REQUEST);
        let layers = write_file(
            &dir,
            "layers.json",
            r#"{"retrieved":{"chunks":[
                {"source":"rag:chunk-1","content":"foreign","projectId":"project-2"}]}}"#,
        );

        let response = execute(
            &AppConfig::default(),
            ASSEMBLE_CHANNEL,
            &request,
            Some(layers.as_path()),
        )
        .await
        .unwrap();
        assert_eq!(response["ok"], false);
        assert_eq!(response["error"]["code"], "CONTEXT_SCOPE_VIOLATION");
        assert!(print_envelope(&response).is_err());
    }

    #[tokio::test]
    async fn inspect_uses_configured_roles() {
        let dir = tempfile::tempdir().unwrap();
        let request = write_file(
            &dir,
            "inspect.json",
            r#"{"projectId":"project-1","documentId":"document-1","cursorPosition":0,
                "skillId":"continue-writing","debugMode":true,"requestedBy":"ed",
                "callerRole":"editor"}"#,
        );

        let denied = execute(&AppConfig::default(), INSPECT_CHANNEL, &request, None)
            .await
            .unwrap();
        assert_eq!(denied["error"]["code"], "CONTEXT_INSPECT_FORBIDDEN");

        let mut config = AppConfig::default();
        config.inspect.allowed_roles = vec!["editor".into()];
        let allowed = execute(&config, INSPECT_CHANNEL, &request, None)
            .await
            .unwrap();
        assert_eq!(allowed["ok"], true);
        assert_eq!(allowed["data"]["inspectMeta"]["requestedBy"], "ed");
    }

    #[tokio::test]
    async fn missing_request_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(
            execute(&AppConfig::default(), ASSEMBLE_CHANNEL, &missing, None)
                .await
                .is_err()
        );
    }
}
