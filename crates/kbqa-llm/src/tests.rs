//! Snapshot tests for the HTTP clients

#[cfg(test)]
mod snapshot_tests {
    use crate::client::ChatClient;
    use crate::LlmConfig;
    use insta::{assert_snapshot, assert_yaml_snapshot};
    use kbqa_core::GenerationConfig;

    #[test]
    fn test_config_snapshot() {
        let config = LlmConfig {
            api_key: "sk-live-secret".to_string(),
            base_url: "https://api.deepseek.com".to_string(),
            model: "deepseek-chat".to_string(),
            timeout_secs: 60,
        };

        assert_yaml_snapshot!(config, {
            ".api_key" => "[redacted]",
        }, @r###"
        api_key: "[redacted]"
        base_url: "https://api.deepseek.com"
        model: deepseek-chat
        timeout_secs: 60
        "###);
    }

    #[test]
    fn test_request_body_shape() {
        let request = ChatClient::build_request("What is a garbled circuit?", &GenerationConfig::default());
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["model"], "deepseek-chat");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["stream"], false);
        assert_eq!(body["max_tokens"], 2048);

        let keys: Vec<String> = body
            .as_object()
            .unwrap()
            .keys()
            .cloned()
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        assert_snapshot!(keys.join("\n"), @r###"
        frequency_penalty
        max_tokens
        messages
        model
        presence_penalty
        stream
        temperature
        top_p
        "###);
    }
}
