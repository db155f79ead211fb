// Echo Plugin
// Returns its parameters as a single data record

use super::{event_stream, InvocationContext, Plugin, PluginEvent, PluginEventStream};

use serde_json::{Map, Value};

/// Plugin that echoes its parameters back
///
/// Used by summary steps and by dry runs, where every plugin is replaced by an echo.
#[derive(Debug, Clone)]
pub struct EchoPlugin {
    name: String,
}

impl EchoPlugin {
    pub fn new() -> Self {
        Self::named("echo")
    }

    /// An echo plugin registered under another name
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for EchoPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Plugin for EchoPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Returns its parameters unchanged"
    }

    async fn invoke(
        &self,
        parameters: Map<String, Value>,
        context: InvocationContext,
    ) -> PluginEventStream {
        event_stream(vec![
            PluginEvent::status(format!("{} for case {}", self.name, context.case_id)),
            PluginEvent::data(Value::Object(parameters)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hunt::models::UserContext;
    use serde_json::json;
    use tokio_stream::StreamExt;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_echo_returns_parameters() {
        let plugin = EchoPlugin::named("whois_lookup");
        let mut params = Map::new();
        params.insert("domain".to_string(), json!("example.com"));

        let context = InvocationContext::new(
            "case-9",
            UserContext::new("u", "analyst"),
            CancellationToken::new(),
        );
        let events: Vec<PluginEvent> = plugin.invoke(params, context).await.collect().await;

        assert_eq!(
            events,
            vec![
                PluginEvent::status("whois_lookup for case case-9"),
                PluginEvent::data(json!({ "domain": "example.com" })),
            ]
        );
    }
}
