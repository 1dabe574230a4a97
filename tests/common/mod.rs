//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{Value, json};
use shop_assist::agent::classifier::ClassificationCache;
use shop_assist::agent::{
    AgentConfig, ChatRequest, ChatResponse, LlmProvider, PromptSet, Services, Supervisor,
    TokenUsage, ToolCall,
};
use shop_assist::core::{CatalogSchema, RankedItem};
use shop_assist::error::AgentError;
use shop_assist::retrieval::InMemoryCatalog;

/// Gateway that answers by route; the route is the request's system prompt.
#[derive(Default)]
pub struct Gateway {
    routes: Mutex<HashMap<String, VecDeque<Result<ChatResponse, String>>>>,
    calls: Mutex<Vec<(String, ChatRequest)>>,
}

fn usage() -> TokenUsage {
    TokenUsage {
        prompt_tokens: 20,
        completion_tokens: 10,
        total_tokens: 30,
    }
}

impl Gateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, route: &str, reply: Result<ChatResponse, String>) {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(route.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Queues a text completion; the last queued reply repeats.
    pub fn text(&self, route: &str, content: &str) -> &Self {
        self.push(
            route,
            Ok(ChatResponse {
                content: content.to_string(),
                usage: usage(),
                tool_calls: Vec::new(),
                finish_reason: Some("stop".to_string()),
            }),
        );
        self
    }

    /// Queues a JSON completion.
    pub fn json(&self, route: &str, value: &Value) -> &Self {
        self.text(route, &value.to_string())
    }

    /// Queues one tool call.
    pub fn tool(&self, route: &str, name: &str, arguments: &Value) -> &Self {
        self.push(
            route,
            Ok(ChatResponse {
                content: String::new(),
                usage: usage(),
                tool_calls: vec![ToolCall {
                    id: format!("call_{name}"),
                    name: name.to_string(),
                    arguments: arguments.to_string(),
                }],
                finish_reason: Some("tool_calls".to_string()),
            }),
        );
        self
    }

    /// Queues a rate-limit failure.
    pub fn fail(&self, route: &str) -> &Self {
        self.push(route, Err(format!("{route} is busy")));
        self
    }

    /// Calls made on `route`.
    pub fn calls(&self, route: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(r, _)| r == route)
            .count()
    }

    /// User prompts sent on `route`, oldest first.
    pub fn prompts(&self, route: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(r, _)| r == route)
            .filter_map(|(_, req)| req.messages.get(1).map(|m| m.content.clone()))
            .collect()
    }
}

#[async_trait]
impl LlmProvider for Gateway {
    fn name(&self) -> &'static str {
        "gateway-stub"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        let route = request
            .messages
            .first()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((route.clone(), request.clone()));

        let reply = {
            let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
            match routes.get_mut(&route) {
                Some(q) if q.len() > 1 => q.pop_front(),
                Some(q) => q.front().cloned(),
                None => None,
            }
        };
        match reply {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(AgentError::RateLimited { message }),
            None => Err(AgentError::InvalidResponse {
                message: format!("unscripted route {route:?}"),
            }),
        }
    }
}

fn route_prompts() -> PromptSet {
    PromptSet {
        classifier: "classifier".to_string(),
        extractor: "extractor".to_string(),
        validator: "validator".to_string(),
        interviewer: "interviewer".to_string(),
        narrator: "narrator".to_string(),
        analyst: "analyst".to_string(),
        verifier: "verifier".to_string(),
        general: "general".to_string(),
        synthesizer: "synthesizer".to_string(),
    }
}

pub fn car(id: &str, title: &str, price: f64, body: &str, fuel: &str) -> RankedItem {
    RankedItem {
        id: id.to_string(),
        title: title.to_string(),
        price,
        source: "lot".to_string(),
        rating: None,
        photos: Vec::new(),
        attributes: BTreeMap::from([
            ("body_style".to_string(), json!(body)),
            ("fuel_type".to_string(), json!(fuel)),
        ]),
    }
}

pub fn catalog() -> Vec<RankedItem> {
    vec![
        car("rav4", "Toyota RAV4 Hybrid", 33_000.0, "suv", "hybrid"),
        car("crv", "Honda CR-V", 31_000.0, "suv", "gasoline"),
        car("forester", "Subaru Forester", 29_000.0, "suv", "gasoline"),
        car("civic", "Honda Civic", 24_000.0, "sedan", "gasoline"),
        car("prius", "Toyota Prius", 28_000.0, "sedan", "hybrid"),
    ]
}

pub fn supervisor(gateway: &Arc<Gateway>) -> Supervisor {
    let config = AgentConfig::builder()
        .api_key("test")
        .build()
        .unwrap_or_else(|e| unreachable!("{e}"));
    let provider: Arc<dyn LlmProvider> = Arc::clone(gateway) as Arc<dyn LlmProvider>;
    let services = Services {
        provider,
        retrieval: Arc::new(InMemoryCatalog::new(catalog())),
        config: Arc::new(config),
        prompts: Arc::new(route_prompts()),
        schema: Arc::new(CatalogSchema::default()),
    };
    Supervisor::new(services, Arc::new(ClassificationCache::new(32)))
}

/// Classifier verdict with the given flags.
pub fn verdict(interview: bool, search: bool, analytical: bool, filter_update: bool) -> Value {
    json!({
        "needs_interview": interview,
        "needs_search": search,
        "needs_analytical": analytical,
        "analytical_questions": [],
        "has_filter_update": filter_update,
        "is_general_conversation": !(interview || search || analytical || filter_update),
        "reasoning": "scripted"
    })
}

pub fn no_new_filters() -> Value {
    json!({"has_new_filters": false, "filters": {}, "preferences": {}})
}
