#[cfg(test)]
mod tests {
    use crate::llm::openai::OpenAIClient;
    use crate::llm::LLMClient;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use serde_json::json;

    const TEST_MODEL: &str = "test-model";
    const TEST_EMBEDDING_MODEL: &str = "test-embedding-model";
    const TEST_API_KEY: &str = "sk-test-key";

    fn client(server: &MockServer) -> OpenAIClient {
        OpenAIClient::new(
            TEST_API_KEY.to_string(),
            TEST_MODEL.to_string(),
            TEST_EMBEDDING_MODEL.to_string(),
            Some(server.uri()),
        )
    }

    #[tokio::test]
    async fn test_generate_sends_system_prompt() {
        let mock_server = MockServer::start().await;

        let expected_response = json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "model": TEST_MODEL,
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "{\"primaryEmotion\": \"calm\"}" },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 5, "total_tokens": 17 }
        });

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", format!("Bearer {}", TEST_API_KEY).as_str()))
            .and(body_partial_json(json!({
                "model": TEST_MODEL,
                "messages": [
                    { "role": "system", "content": "be brief" },
                    { "role": "user", "content": "How was today?" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(expected_response))
            .mount(&mock_server)
            .await;

        let result = client(&mock_server).generate(Some("be brief"), "How was today?").await.unwrap();
        assert_eq!(result.data, "{\"primaryEmotion\": \"calm\"}");
        assert_eq!(result.usage.total_tokens, 17);
    }

    #[tokio::test]
    async fn test_generate_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string(r#"{"error": {"message": "Invalid Authentication"}}"#))
            .mount(&mock_server)
            .await;

        let result = client(&mock_server).generate(None, "Say hello").await;
        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("OpenAI API error (401 Unauthorized)"));
    }

    #[tokio::test]
    async fn test_generate_without_content_is_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&mock_server)
            .await;

        let result = client(&mock_server).generate(None, "hi").await;
        assert!(result.unwrap_err().to_string().contains("No content"));
    }

    #[tokio::test]
    async fn test_embed_success() {
        let mock_server = MockServer::start().await;

        let expected_response = json!({
            "object": "list",
            "data": [
                { "object": "embedding", "embedding": [0.1, 0.2, 0.3], "index": 0 }
            ],
            "model": TEST_EMBEDDING_MODEL,
            "usage": { "prompt_tokens": 8, "total_tokens": 8 }
        });

        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("Authorization", format!("Bearer {}", TEST_API_KEY).as_str()))
            .and(body_partial_json(json!({ "model": TEST_EMBEDDING_MODEL, "input": ["test text"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(expected_response))
            .mount(&mock_server)
            .await;

        let embedding = client(&mock_server).embed("test text").await.unwrap();
        assert_eq!(embedding.data, vec![0.1, 0.2, 0.3]);
        assert_eq!(embedding.usage.completion_tokens, 0);
    }

    #[tokio::test]
    async fn test_embed_empty_data_is_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&mock_server)
            .await;

        let result = client(&mock_server).embed("x").await;
        assert!(result.unwrap_err().to_string().contains("Empty embedding"));
    }
}
