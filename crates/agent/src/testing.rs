//! Scripted providers for exercising agents without network access.
//!
//! Each call to `stream` replays the next scripted turn as decoded
//! [`StreamEvent`]s and records the request it was given.

use std::sync::Mutex;

use fieldagent_core::error::ProviderError;
use fieldagent_core::provider::{EventStream, Provider, ProviderRequest, StreamEvent, Usage};
use tokio::sync::mpsc;

/// One scripted turn: events to replay, in order.
pub type ScriptedTurn = Vec<Result<StreamEvent, ProviderError>>;

pub struct ScriptedProvider {
    turns: Mutex<Vec<ScriptedTurn>>,
    repeat_last: bool,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns),
            repeat_last: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replay the final turn forever once the script runs out.
    pub fn repeating(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            repeat_last: true,
            ..Self::new(turns)
        }
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    fn next_turn(&self) -> Option<ScriptedTurn> {
        let mut turns = self.turns.lock().ok()?;
        match turns.len() {
            0 => None,
            1 if self.repeat_last => turns.first().cloned(),
            _ => Some(turns.remove(0)),
        }
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<EventStream, ProviderError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        let turn = self.next_turn().ok_or_else(|| {
            ProviderError::NotConfigured("scripted provider has no turns left".into())
        })?;

        let (tx, rx) = mpsc::channel(turn.len().max(1));
        for event in turn {
            // Buffer is sized to the turn; the receiver is still held here.
            let _ = tx.try_send(event);
        }
        Ok(rx)
    }
}

/// A provider whose requests fail to open.
pub struct FailingProvider(pub ProviderError);

#[async_trait::async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn stream(&self, _request: ProviderRequest) -> Result<EventStream, ProviderError> {
        Err(self.0.clone())
    }
}

/// A turn that streams `text` (in two deltas) and ends without tool use.
pub fn text_turn(text: &str) -> ScriptedTurn {
    let split = text.char_indices().nth(text.chars().count() / 2).map_or(0, |(i, _)| i);
    let (head, tail) = text.split_at(split);
    vec![
        Ok(StreamEvent::TextStart { index: 0 }),
        Ok(StreamEvent::TextDelta {
            index: 0,
            text: head.to_string(),
        }),
        Ok(StreamEvent::TextDelta {
            index: 0,
            text: tail.to_string(),
        }),
        Ok(StreamEvent::BlockStop { index: 0 }),
        Ok(StreamEvent::Usage(Usage {
            input_tokens: 12,
            output_tokens: 8,
        })),
        Ok(StreamEvent::MessageStop),
    ]
}

/// A turn with a short text preamble followed by the given tool uses.
///
/// Each input is serialised and fed back in small fragments, the way the
/// completion API streams it.
pub fn tool_turn(preamble: &str, calls: &[(&str, &str, serde_json::Value)]) -> ScriptedTurn {
    let mut events = vec![
        Ok(StreamEvent::TextStart { index: 0 }),
        Ok(StreamEvent::TextDelta {
            index: 0,
            text: preamble.to_string(),
        }),
        Ok(StreamEvent::BlockStop { index: 0 }),
    ];
    for (offset, (id, name, input)) in calls.iter().enumerate() {
        let index = offset + 1;
        events.push(Ok(StreamEvent::ToolUseStart {
            index,
            id: id.to_string(),
            name: name.to_string(),
        }));
        events.extend(fragments(&input.to_string(), 7).into_iter().map(|partial_json| {
            Ok(StreamEvent::InputDelta {
                index,
                partial_json,
            })
        }));
        events.push(Ok(StreamEvent::BlockStop { index }));
    }
    events.push(Ok(StreamEvent::MessageStop));
    events
}

/// A turn with a single tool use whose raw input is given verbatim.
pub fn raw_tool_turn(id: &str, name: &str, raw_input: &str) -> ScriptedTurn {
    vec![
        Ok(StreamEvent::ToolUseStart {
            index: 0,
            id: id.to_string(),
            name: name.to_string(),
        }),
        Ok(StreamEvent::InputDelta {
            index: 0,
            partial_json: raw_input.to_string(),
        }),
        Ok(StreamEvent::BlockStop { index: 0 }),
        Ok(StreamEvent::MessageStop),
    ]
}

fn fragments(s: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    chars.chunks(size).map(|c| c.iter().collect()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_turn_fragments_rejoin() {
        let input = serde_json::json!({"address": "1600 Amphitheatre Pkwy"});
        let turn = tool_turn("Looking it up.", &[("toolu_1", "geocode_address", input.clone())]);
        let joined: String = turn
            .iter()
            .filter_map(|e| match e {
                Ok(StreamEvent::InputDelta { partial_json, .. }) => Some(partial_json.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(serde_json::from_str::<serde_json::Value>(&joined).unwrap(), input);
    }

    #[tokio::test]
    async fn replays_turns_then_runs_dry() {
        let provider = ScriptedProvider::new(vec![text_turn("hello")]);
        let request = ProviderRequest {
            model: "m".into(),
            system: None,
            messages: vec![],
            temperature: 0.3,
            max_tokens: 16,
            tools: vec![],
        };
        let mut rx = provider.stream(request.clone()).await.unwrap();
        let mut text = String::new();
        while let Some(Ok(event)) = rx.recv().await {
            if let StreamEvent::TextDelta { text: t, .. } = event {
                text.push_str(&t);
            }
        }
        assert_eq!(text, "hello");
        assert!(provider.stream(request).await.is_err());
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn repeating_provider_never_runs_dry() {
        let provider = ScriptedProvider::repeating(vec![raw_tool_turn("t", "x", "{}")]);
        for _ in 0..3 {
            let request = ProviderRequest {
                model: "m".into(),
                system: None,
                messages: vec![],
                temperature: 0.3,
                max_tokens: 16,
                tools: vec![],
            };
            assert!(provider.stream(request).await.is_ok());
        }
    }
}
