use super::context::print_json;
use super::pin::format_results;
use pinrelay::cid::ContentId;
use pinrelay::orchestrator::PinningResult;
use pinrelay::service::PinService;
use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Debug, Serialize)]
struct UploadOutput {
    identifier: ContentId,
    bytes: usize,
    sha256: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    replication: Option<Vec<PinningResult>>,
}

/// Store a file locally, optionally replicating it.
///
/// With `replicate`, replication runs on a background task and the command
/// waits for it; the upload itself has already succeeded by then.
pub async fn upload(
    service: &PinService,
    file: &str,
    replicate: bool,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = tokio::fs::read(file)
        .await
        .map_err(|e| format!("failed to read {}: {}", file, e))?;

    let (identifier, replication) = if replicate {
        let (cid, handle) = service.upload_and_replicate(&data).await?;
        (cid, Some(handle.wait().await?))
    } else {
        (service.upload(&data).await?, None)
    };

    let output = UploadOutput {
        identifier,
        bytes: data.len(),
        sha256: hex::encode(Sha256::digest(&data)),
        replication,
    };

    if json {
        return print_json(&output);
    }
    println!("{}", output.identifier);
    println!("  {} bytes, sha256 {}", output.bytes, output.sha256);
    if let Some(results) = &output.replication {
        print!("{}", format_results(results));
    }
    Ok(())
}

/// Write content to `output`, fetching it from the network if needed.
pub async fn retrieve(service: &PinService, cid: &str, output: &str) -> Result<(), Box<dyn std::error::Error>> {
    let cid = ContentId::parse(cid)?;
    let data = service.retrieve(&cid).await?;
    tokio::fs::write(output, &data)
        .await
        .map_err(|e| format!("failed to write {}: {}", output, e))?;
    println!("Wrote {} bytes to {}", data.len(), output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinrelay::remote::{ConfirmationPolicy, MockPinningProvider, RemotePinClient};
    use pinrelay::store::MemoryContentStore;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn service_with(provider: &MockPinningProvider) -> PinService {
        let client = RemotePinClient::new(
            Arc::new(provider.clone()),
            ConfirmationPolicy::new(2, Duration::from_millis(5)),
        );
        PinService::new(Arc::new(MemoryContentStore::new()), vec![Arc::new(client)], None)
    }

    #[tokio::test]
    async fn test_upload_then_retrieve_file() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("in.txt");
        let output = temp_dir.path().join("out.txt");
        std::fs::write(&input, b"hello-world").unwrap();

        let provider = MockPinningProvider::new("providerA");
        let service = service_with(&provider);

        upload(&service, input.to_str().unwrap(), false, false).await.unwrap();
        assert_eq!(provider.submit_calls(), 0);

        let cid = ContentId::for_bytes(b"hello-world");
        retrieve(&service, cid.as_str(), output.to_str().unwrap()).await.unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"hello-world");
    }

    #[tokio::test]
    async fn test_upload_with_replicate_waits() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("in.txt");
        std::fs::write(&input, b"replicated").unwrap();

        let provider = MockPinningProvider::new("providerA");
        let service = service_with(&provider);

        upload(&service, input.to_str().unwrap(), true, true).await.unwrap();
        assert!(provider.has_pin(&ContentId::for_bytes(b"replicated")));
    }

    #[tokio::test]
    async fn test_upload_missing_file_fails() {
        let provider = MockPinningProvider::new("providerA");
        let service = service_with(&provider);
        assert!(upload(&service, "/nonexistent/file", false, false).await.is_err());
    }

    #[tokio::test]
    async fn test_retrieve_rejects_bad_identifier() {
        let provider = MockPinningProvider::new("providerA");
        let service = service_with(&provider);
        assert!(retrieve(&service, "not a cid", "/tmp/unused").await.is_err());
    }
}
