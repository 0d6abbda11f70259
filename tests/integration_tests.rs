//! Integration tests for the confab library.
//! These tests require a live OpenAI-compatible endpoint to run; set
//! CONFAB_TEST_BASE_URL (and CONFAB_TEST_MODEL) to enable them.

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use confab::{ChatClient, ChatRequest, StreamDelta, Transport, WireMessage};

    fn test_endpoint() -> Option<(String, String)> {
        let base_url = std::env::var("CONFAB_TEST_BASE_URL").ok()?;
        let model =
            std::env::var("CONFAB_TEST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        Some((base_url, model))
    }

    #[tokio::test]
    async fn list_models_returns_identifiers() {
        let Some((base_url, _)) = test_endpoint() else {
            eprintln!("Skipping test: CONFAB_TEST_BASE_URL not set");
            return;
        };

        let client = ChatClient::new(base_url, None).expect("Failed to create client");
        let models = client.list_models().await.expect("model listing failed");
        assert!(!models.is_empty(), "endpoint should serve at least one model");
    }

    #[tokio::test]
    async fn simple_completion_request() {
        let Some((base_url, model)) = test_endpoint() else {
            eprintln!("Skipping test: CONFAB_TEST_BASE_URL not set");
            return;
        };

        let client = ChatClient::new(base_url, None).expect("Failed to create client");
        let request = ChatRequest::new(model, vec![WireMessage::user("Say 'test passed'")]);
        let response = client.complete(request).await;
        assert!(response.is_ok(), "Request should succeed: {response:?}");
    }

    #[tokio::test]
    async fn streaming_response_yields_deltas() {
        let Some((base_url, model)) = test_endpoint() else {
            eprintln!("Skipping test: CONFAB_TEST_BASE_URL not set");
            return;
        };

        let client = ChatClient::new(base_url, None).expect("Failed to create client");
        let request = ChatRequest::new_streaming(model, vec![WireMessage::user("Count to 3")]);
        let mut stream = client.stream(request).await.expect("stream request failed");

        let mut saw_answer = false;
        while let Some(delta) = stream.next().await {
            match delta.expect("stream delta errored") {
                StreamDelta::Answer(_) => saw_answer = true,
                StreamDelta::Thinking(_) => {}
                StreamDelta::End => break,
            }
        }
        assert!(saw_answer, "Expected at least one answer delta");
    }
}
