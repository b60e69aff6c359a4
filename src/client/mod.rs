//! Streaming chat session against the chat-completions endpoint.
//!
//! The session owns the conversation history and drives the full turn loop:
//! send the history plus function schemas, assemble the streamed response,
//! and either finish with a content reply or dispatch the requested function
//! call and go around again.

pub mod chunk;
pub mod message;
pub mod sse;
pub mod transport;

use std::collections::HashMap;
use std::env;

use async_stream::try_stream;
use futures::stream::{Stream, StreamExt};
use futures::pin_mut;
use tracing::{debug, info, warn};

use crate::client::chunk::ResponseData;
use crate::client::message::Message;
use crate::client::transport::{ApiClient, ChatCompletionRequest, ChatTransport};
use crate::config::ClientConfig;
use crate::core::error::GptError;
use crate::registry::FunctionRegistry;

/// A chat session bound to one model and one system prompt.
///
/// Not usable concurrently: every call takes `&mut self`, so a second turn
/// cannot start until the current one has finished or failed.
pub struct GptCommandsClient {
    transport: Box<dyn ChatTransport>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message>,
}

impl GptCommandsClient {
    /// Create a session talking to the configured endpoint. The system prompt
    /// is installed as the first message and never removed.
    pub fn new(config: ClientConfig, system_prompt: impl Into<String>) -> Result<Self, GptError> {
        let api_key = config.resolve_api_key()?;
        let organization = config
            .organization
            .clone()
            .or_else(|| env::var("OPENAI_ORGANIZATION").ok());
        let extra_headers = organization
            .map(|org| HashMap::from([("OpenAI-Organization".to_string(), org)]));
        let transport = ApiClient::new(config.api_base.clone(), api_key, extra_headers);
        Ok(Self::with_transport(Box::new(transport), config, system_prompt))
    }

    /// Create a session over a caller-provided transport.
    pub fn with_transport(
        transport: Box<dyn ChatTransport>,
        config: ClientConfig,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            model: config.model,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            messages: vec![Message::system(system_prompt)],
        }
    }

    /// The conversation so far, system prompt first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    fn request_body(&self, registry: &FunctionRegistry) -> Result<ChatCompletionRequest, GptError> {
        Ok(ChatCompletionRequest {
            model: self.model.clone(),
            messages: self.messages.clone(),
            functions: registry.schemas()?,
            max_tokens: self.max_tokens,
            n: 1,
            temperature: self.temperature,
            stream: true,
        })
    }

    /// Send a prompt and stream the reply's content fragments.
    ///
    /// When the model requests a function call, the call is dispatched
    /// through `registry` once the response is fully drained; if the function
    /// returns a value, its result is appended as a function message and the
    /// loop issues a follow-up request. A void function ends the turn. The
    /// chain is unbounded; `turn` only feeds the logs.
    pub fn chat_stream<'a>(
        &'a mut self,
        prompt: impl Into<String>,
        registry: &'a FunctionRegistry,
    ) -> impl Stream<Item = Result<String, GptError>> + 'a {
        let mut outbound = Some(Message::user(prompt.into()));
        try_stream! {
            let mut turn = 0u32;
            while let Some(message) = outbound.take() {
                turn += 1;
                debug!(turn, role = ?message.role, "sending message");
                self.messages.push(message);

                let body = self.request_body(registry)?;
                let bytes = self.transport.post_chat(&body).await?;
                let payloads = sse::decode_sse(bytes);
                pin_mut!(payloads);

                let mut response: Option<ResponseData> = None;
                while let Some(payload) = payloads.next().await {
                    let data = ResponseData::fold(response.take(), &payload?)?;
                    if let Some(delta) = &data.delta_text {
                        if !delta.is_empty() {
                            yield delta.clone();
                        }
                    }
                    let ready = data.ready;
                    response = Some(data);
                    if ready {
                        break;
                    }
                }

                let Some(response) = response.filter(|data| data.ready) else {
                    warn!(turn, "stream ended before a finish reason");
                    break;
                };

                if let Some(assistant) = response.assistant_message() {
                    info!(chars = assistant.content.len(), "storing assistant message");
                    self.messages.push(assistant);
                }

                let Some(call) = response.function_execution()? else {
                    break;
                };
                info!(function = %call.name, "dispatching function call");
                match registry.execute(&call.name, &call.arguments).await? {
                    Some(result) => {
                        outbound = Some(Message::function(call.name, result));
                    }
                    // A void function has nothing to feed back; the turn ends
                    // with whatever content was already emitted.
                    None => break,
                }
            }
        }
    }

    /// Send a prompt and collect the streamed reply into one string.
    pub async fn chat(
        &mut self,
        prompt: impl Into<String>,
        registry: &FunctionRegistry,
    ) -> Result<String, GptError> {
        let stream = self.chat_stream(prompt, registry);
        pin_mut!(stream);
        let mut result = String::new();
        while let Some(fragment) = stream.next().await {
            result.push_str(&fragment?);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::transport::ByteStream;
    use crate::registry::CommandArgs;
    use crate::schema::ParamType;
    use async_trait::async_trait;
    use futures::stream;
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};

    /// Transport that replays scripted SSE bodies and records request bodies.
    struct ScriptedTransport {
        bodies: Mutex<Vec<String>>,
        requests: Arc<Mutex<Vec<Value>>>,
    }

    impl ScriptedTransport {
        fn new(bodies: Vec<String>) -> (Self, Arc<Mutex<Vec<Value>>>) {
            let requests = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    // Scripts replay in order; pop from the front.
                    bodies: Mutex::new(bodies),
                    requests: requests.clone(),
                },
                requests,
            )
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn post_chat(
            &self,
            request: &ChatCompletionRequest,
        ) -> Result<ByteStream, GptError> {
            self.requests
                .lock()
                .unwrap()
                .push(serde_json::to_value(request).unwrap());
            let mut bodies = self.bodies.lock().unwrap();
            if bodies.is_empty() {
                return Err(GptError::Transport {
                    status: 500,
                    body: "script exhausted".to_string(),
                });
            }
            let body = bodies.remove(0);
            Ok(stream::iter(vec![Ok::<_, GptError>(body.into_bytes())]).boxed())
        }
    }

    fn sse_body(events: &[Value]) -> String {
        let mut body = String::new();
        for event in events {
            body.push_str("data: ");
            body.push_str(&event.to_string());
            body.push_str("\n\n");
        }
        body.push_str("data: [DONE]\n\n");
        body
    }

    fn content_event(content: &str, finish_reason: Option<&str>) -> Value {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 1700000000,
            "model": "gpt-4",
            "choices": [{
                "index": 0,
                "delta": {"content": content},
                "finish_reason": finish_reason,
            }],
        })
    }

    fn call_event(name: Option<&str>, arguments: Option<&str>, finish_reason: Option<&str>) -> Value {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 1700000000,
            "model": "gpt-4",
            "choices": [{
                "index": 0,
                "delta": {"function_call": {"name": name, "arguments": arguments}},
                "finish_reason": finish_reason,
            }],
        })
    }

    fn client_with(bodies: Vec<String>) -> (GptCommandsClient, Arc<Mutex<Vec<Value>>>) {
        let (transport, requests) = ScriptedTransport::new(bodies);
        let client = GptCommandsClient::with_transport(
            Box::new(transport),
            ClientConfig::default().with_model("gpt-4"),
            "You are a test assistant.",
        );
        (client, requests)
    }

    fn empty_registry() -> FunctionRegistry {
        FunctionRegistry::builder().build().unwrap()
    }

    #[tokio::test]
    async fn content_only_turn_streams_and_stores_the_reply() {
        let (mut client, requests) = client_with(vec![sse_body(&[
            content_event("Hello", None),
            content_event("!", Some("stop")),
        ])]);
        let registry = empty_registry();

        let reply = client.chat("hi", &registry).await.unwrap();
        assert_eq!(reply, "Hello!");
        assert_eq!(requests.lock().unwrap().len(), 1);

        let messages = client.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].content, "You are a test assistant.");
        assert_eq!(messages[1].content, "hi");
        assert_eq!(messages[2].content, "Hello!");
    }

    #[tokio::test]
    async fn request_carries_history_and_schemas() {
        let (mut client, requests) =
            client_with(vec![sse_body(&[content_event("ok", Some("stop"))])]);
        let registry = FunctionRegistry::builder()
            .function("get_stuff", "Gets stuff")
            .param("simple", ParamType::String, "Sample string")
            .returning(|_| async { Ok(Some(json!("stuff"))) })
            .build()
            .unwrap();

        client.chat("hi", &registry).await.unwrap();

        let requests = requests.lock().unwrap();
        let body = &requests[0];
        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["n"], 1);
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["functions"][0]["name"], "get_stuff");
    }

    #[tokio::test]
    async fn function_call_with_return_feeds_result_back() {
        let (mut client, requests) = client_with(vec![
            sse_body(&[
                call_event(Some("get_stuff"), Some("{\"simple\""), None),
                call_event(None, Some(": \"test\"}"), None),
                call_event(None, None, Some("function_call")),
            ]),
            sse_body(&[content_event("Got it", Some("stop"))]),
        ]);
        let registry = FunctionRegistry::builder()
            .function("get_stuff", "Gets stuff")
            .param("simple", ParamType::String, "Sample string")
            .optional_param("optional", ParamType::Integer, json!(123), "Sample number")
            .returning(|args: CommandArgs| async move {
                let simple = args["simple"].as_str().unwrap_or_default().to_string();
                Ok(Some(json!(format!("{}{}", simple, args["optional"]))))
            })
            .build()
            .unwrap();

        let reply = client.chat("fetch", &registry).await.unwrap();
        assert_eq!(reply, "Got it");
        assert_eq!(requests.lock().unwrap().len(), 2);

        let messages = client.messages();
        // system, user, function result, assistant
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2].role, message::Role::Function);
        assert_eq!(messages[2].name.as_deref(), Some("get_stuff"));
        assert_eq!(messages[2].content, "\"test123\"");
        assert_eq!(messages[3].content, "Got it");
    }

    #[tokio::test]
    async fn void_function_call_ends_the_turn() {
        let executed = Arc::new(Mutex::new(false));
        let flag = executed.clone();
        let (mut client, requests) = client_with(vec![sse_body(&[
            call_event(Some("alohomora"), None, None),
            call_event(None, None, Some("function_call")),
        ])]);
        let registry = FunctionRegistry::builder()
            .function("alohomora", "Unlock the door")
            .handler(move |_| {
                let flag = flag.clone();
                async move {
                    *flag.lock().unwrap() = true;
                    Ok(None)
                }
            })
            .build()
            .unwrap();

        let reply = client.chat("open the door", &registry).await.unwrap();
        assert_eq!(reply, "");
        // No second request, no function-result message.
        assert_eq!(requests.lock().unwrap().len(), 1);
        assert_eq!(client.messages().len(), 2);
        assert!(*executed.lock().unwrap());
    }

    #[tokio::test]
    async fn transport_failure_surfaces_and_keeps_history() {
        let (mut client, _) = client_with(vec![]);
        let registry = empty_registry();

        let err = client.chat("hi", &registry).await.unwrap_err();
        assert!(matches!(err, GptError::Transport { status: 500, .. }));
        // The outbound user message stays appended.
        assert_eq!(client.messages().len(), 2);
    }

    #[tokio::test]
    async fn upstream_error_terminates_the_turn() {
        let body = "data: {\"error\": {\"message\": \"quota exceeded\"}}\n\n".to_string();
        let (mut client, _) = client_with(vec![body]);
        let registry = empty_registry();

        let err = client.chat("hi", &registry).await.unwrap_err();
        assert!(matches!(err, GptError::Upstream(ref message) if message == "quota exceeded"));
    }

    #[tokio::test]
    async fn stream_without_finish_reason_ends_normally() {
        let body = "data: {\"id\":\"x\",\"object\":\"chunk\",\"created\":0,\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"partial\"},\"finish_reason\":null}]}\n\n"
            .to_string();
        let (mut client, requests) = client_with(vec![body]);
        let registry = empty_registry();

        let reply = client.chat("hi", &registry).await.unwrap();
        assert_eq!(reply, "partial");
        assert_eq!(requests.lock().unwrap().len(), 1);
        // Not ready, so no assistant message was stored.
        assert_eq!(client.messages().len(), 2);
    }

    #[tokio::test]
    async fn dispatch_error_carries_function_name() {
        let (mut client, _) = client_with(vec![sse_body(&[
            call_event(Some("explode"), Some("{}"), None),
            call_event(None, None, Some("function_call")),
        ])]);
        let registry = FunctionRegistry::builder()
            .function("explode", "Always fails")
            .returning(|_| async { Err("boom".into()) })
            .build()
            .unwrap();

        let err = client.chat("go", &registry).await.unwrap_err();
        assert!(matches!(err, GptError::Execution { ref function, .. } if function == "explode"));
    }
}
