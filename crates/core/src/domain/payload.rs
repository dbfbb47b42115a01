//! Tagged payloads exchanged between agents.
//!
//! Agents reply with JSON objects whose schema is identified either by a `type` (or `kind`)
//! discriminator or, for untagged replies, by the presence of a characteristic field. Field
//! names mirror the wire contract exactly; flags are the literal strings `"True"`/`"False"`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const CLU_RESULT: &str = "clu_result";
pub const CQA_RESULT: &str = "cqa_result";
pub const ROUTE_DECISION: &str = "route_decision";
pub const FINAL_ANSWER: &str = "final_answer";
pub const TRANSLATION_ENVELOPE: &str = "translation_envelope";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Flag {
    #[serde(rename = "True")]
    True,
    #[default]
    #[serde(rename = "False")]
    False,
}

impl Flag {
    pub fn is_set(&self) -> bool {
        matches!(self, Self::True)
    }
}

impl From<bool> for Flag {
    fn from(value: bool) -> Self {
        if value {
            Self::True
        } else {
            Self::False
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity {
    pub fn order_id(order_id: impl Into<String>) -> Self {
        Self {
            category: Some("OrderId".to_string()),
            name: None,
            text: Some(order_id.into()),
            extra: Map::new(),
        }
    }

    fn is_kind(&self, kind: &str) -> bool {
        self.name.as_deref() == Some(kind) || self.category.as_deref() == Some(kind)
    }
}

/// First `OrderId` entity value, matched on either `name` or `category`.
pub fn find_order_id(entities: &[Entity]) -> Option<&str> {
    entities
        .iter()
        .filter(|entity| entity.is_kind("OrderId"))
        .find_map(|entity| entity.text.as_deref())
        .filter(|text| !text.trim().is_empty())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub name: String,
    #[serde(rename = "confidenceScore")]
    pub confidence_score: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CluConversation {
    #[serde(default)]
    pub intents: Vec<Intent>,
    #[serde(default)]
    pub entities: Vec<Entity>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CluPrediction {
    #[serde(default)]
    pub conversations: Vec<CluConversation>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CluResponse {
    pub result: CluPrediction,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CluResult {
    pub response: CluResponse,
    #[serde(default)]
    pub terminated: Flag,
}

impl CluResult {
    pub fn new(intents: Vec<Intent>, entities: Vec<Entity>) -> Self {
        Self {
            response: CluResponse {
                result: CluPrediction {
                    conversations: vec![CluConversation { intents, entities }],
                },
            },
            terminated: Flag::False,
        }
    }

    pub fn top_intent(&self) -> Option<&Intent> {
        self.response.result.conversations.first().and_then(|conv| conv.intents.first())
    }

    pub fn entities(&self) -> &[Entity] {
        self.response.result.conversations.first().map(|conv| conv.entities.as_slice()).unwrap_or(&[])
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CqaAnswer {
    pub answer: String,
    #[serde(rename = "confidenceScore")]
    pub confidence_score: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CqaResponse {
    #[serde(default)]
    pub answers: Vec<CqaAnswer>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CqaResult {
    pub response: CqaResponse,
    #[serde(default)]
    pub terminated: Flag,
}

impl CqaResult {
    pub fn new(answer: impl Into<String>, confidence_score: f64) -> Self {
        Self {
            response: CqaResponse {
                answers: vec![CqaAnswer { answer: answer.into(), confidence_score }],
            },
            terminated: Flag::True,
        }
    }

    pub fn top_answer(&self) -> Option<&CqaAnswer> {
        self.response.answers.first()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteDecision {
    pub target_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub terminated: Flag,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinalAnswer {
    /// Either plain text or a structured object produced by a fulfillment agent.
    pub response: Value,
    #[serde(default)]
    pub terminated: Flag,
    #[serde(default)]
    pub need_more_info: Flag,
}

impl FinalAnswer {
    pub fn text(response: impl Into<String>, need_more_info: bool) -> Self {
        Self {
            response: Value::String(response.into()),
            terminated: Flag::True,
            need_more_info: need_more_info.into(),
        }
    }

    pub fn response_text(&self) -> String {
        match &self.response {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TranslationEnvelope {
    pub origin_language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TaggedPayload {
    CluResult(CluResult),
    CqaResult(CqaResult),
    RouteDecision(RouteDecision),
    FinalAnswer(FinalAnswer),
    TranslationEnvelope(TranslationEnvelope),
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload is not valid JSON: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("payload `{kind}` does not match its schema: {source}")]
    Schema {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown payload kind `{0}`")]
    UnknownKind(String),
    #[error("payload carries no discriminator or recognizable field")]
    Unrecognized,
}

impl PayloadError {
    /// True when the content could not be read as the tagged JSON it claims to be.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_) | Self::NotAnObject | Self::Schema { .. })
    }
}

impl TaggedPayload {
    pub fn parse(raw: &str) -> Result<Self, PayloadError> {
        let value = serde_json::from_str::<Value>(raw).map_err(PayloadError::Malformed)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, PayloadError> {
        let (tag, shape) = match &value {
            Value::Object(map) => {
                let tag = map.get("type").or_else(|| map.get("kind")).map(|tag| match tag {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                });
                let shape = ["target_agent", "origin_language", "response"]
                    .into_iter()
                    .find(|field| map.contains_key(*field));
                (tag, shape)
            }
            _ => return Err(PayloadError::NotAnObject),
        };

        match (tag.as_deref(), shape) {
            (Some(CLU_RESULT), _) => decode(value, CLU_RESULT).map(Self::CluResult),
            (Some(CQA_RESULT), _) => decode(value, CQA_RESULT).map(Self::CqaResult),
            (Some(ROUTE_DECISION), _) | (None, Some("target_agent")) => {
                decode(value, ROUTE_DECISION).map(Self::RouteDecision)
            }
            (Some(TRANSLATION_ENVELOPE), _) | (None, Some("origin_language")) => {
                decode(value, TRANSLATION_ENVELOPE).map(Self::TranslationEnvelope)
            }
            (Some(FINAL_ANSWER), _) | (None, Some(_)) => {
                decode(value, FINAL_ANSWER).map(Self::FinalAnswer)
            }
            (Some(other), _) => Err(PayloadError::UnknownKind(other.to_string())),
            (None, None) => Err(PayloadError::Unrecognized),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::CluResult(_) => CLU_RESULT,
            Self::CqaResult(_) => CQA_RESULT,
            Self::RouteDecision(_) => ROUTE_DECISION,
            Self::FinalAnswer(_) => FINAL_ANSWER,
            Self::TranslationEnvelope(_) => TRANSLATION_ENVELOPE,
        }
    }

    pub fn to_value(&self) -> Value {
        let (value, tag) = match self {
            Self::CluResult(inner) => (serde_json::to_value(inner), Some(CLU_RESULT)),
            Self::CqaResult(inner) => (serde_json::to_value(inner), Some(CQA_RESULT)),
            Self::RouteDecision(inner) => (serde_json::to_value(inner), None),
            Self::FinalAnswer(inner) => (serde_json::to_value(inner), None),
            Self::TranslationEnvelope(inner) => (serde_json::to_value(inner), None),
        };
        // Derived serializers over plain fields and `Value` cannot fail.
        let mut value = value.unwrap_or(Value::Null);
        if let (Some(tag), Value::Object(map)) = (tag, &mut value) {
            map.insert("type".to_string(), Value::String(tag.to_string()));
        }
        value
    }

    pub fn to_json(&self) -> String {
        self.to_value().to_string()
    }
}

fn decode<T>(value: Value, kind: &'static str) -> Result<T, PayloadError>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_value(value).map_err(|source| PayloadError::Schema { kind, source })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        find_order_id, CluResult, CqaResult, Entity, FinalAnswer, Flag, Intent, PayloadError,
        TaggedPayload,
    };

    #[test]
    fn clu_result_wire_shape_is_parsed() {
        let raw = json!({
            "type": "clu_result",
            "response": {"result": {"conversations": [{
                "intents": [{"name": "OrderStatus", "confidenceScore": 0.91}],
                "entities": [{"category": "OrderId", "text": "12345", "offset": 31}]
            }]}},
            "terminated": "False"
        })
        .to_string();

        let payload = TaggedPayload::parse(&raw).expect("clu payload should parse");
        let TaggedPayload::CluResult(clu) = payload else {
            panic!("expected clu_result");
        };
        let intent = clu.top_intent().expect("top intent");
        assert_eq!(intent.name, "OrderStatus");
        assert!((intent.confidence_score - 0.91).abs() < f64::EPSILON);
        assert_eq!(find_order_id(clu.entities()), Some("12345"));
        assert_eq!(clu.entities()[0].extra.get("offset"), Some(&json!(31)));
    }

    #[test]
    fn kind_field_is_accepted_as_discriminator() {
        let raw = r#"{"kind":"cqa_result","response":{"answers":[{"answer":"Yes","confidenceScore":0.7}]},"terminated":"True"}"#;
        let payload = TaggedPayload::parse(raw).expect("cqa payload should parse");
        assert_eq!(payload.kind(), "cqa_result");
    }

    #[test]
    fn every_known_tag_decodes_into_its_variant() {
        let route = TaggedPayload::parse(
            r#"{"type":"route_decision","target_agent":"OrderStatusAgent","intent":"OrderStatus","entities":[],"terminated":"False"}"#,
        )
        .expect("tagged route decision");
        assert!(matches!(route, TaggedPayload::RouteDecision(ref decision)
            if decision.target_agent.as_deref() == Some("OrderStatusAgent")));

        let answer = TaggedPayload::parse(
            r#"{"type":"final_answer","response":"Order 12345 is shipped.","terminated":"True","need_more_info":"False"}"#,
        )
        .expect("tagged final answer");
        assert!(matches!(answer, TaggedPayload::FinalAnswer(ref answer)
            if answer.response_text() == "Order 12345 is shipped."));

        let envelope = TaggedPayload::parse(
            r#"{"kind":"translation_envelope","origin_language":"es","final_answer":"Hola"}"#,
        )
        .expect("tagged translation envelope");
        assert!(matches!(envelope, TaggedPayload::TranslationEnvelope(ref envelope)
            if envelope.final_answer.as_deref() == Some("Hola")));
    }

    #[test]
    fn tagged_payload_must_match_its_schema() {
        let error = TaggedPayload::parse(r#"{"type":"final_answer","terminated":"True"}"#)
            .expect_err("final answer without a response");
        assert!(matches!(error, PayloadError::Schema { kind: "final_answer", .. }));
    }

    #[test]
    fn unknown_tag_is_a_hard_error() {
        let error = TaggedPayload::parse(r#"{"type":"sentiment_result","response":{}}"#)
            .expect_err("unknown kinds must not parse");
        assert!(matches!(error, PayloadError::UnknownKind(ref kind) if kind == "sentiment_result"));
        assert!(!error.is_malformed());
    }

    #[test]
    fn untagged_payloads_are_classified_by_field_presence() {
        let route = TaggedPayload::parse(
            r#"{"target_agent":"OrderCancelAgent","intent":"CancelOrder","entities":[],"terminated":"False"}"#,
        )
        .expect("route decision");
        assert_eq!(route.kind(), "route_decision");

        let envelope =
            TaggedPayload::parse(r#"{"origin_language":"es","current_question":"cancel my order"}"#)
                .expect("translation envelope");
        assert_eq!(envelope.kind(), "translation_envelope");

        let answer = TaggedPayload::parse(
            r#"{"response":{"status":"shipped"},"terminated":"True","need_more_info":"False"}"#,
        )
        .expect("final answer");
        let TaggedPayload::FinalAnswer(answer) = answer else {
            panic!("expected final answer");
        };
        assert_eq!(answer.response_text(), r#"{"status":"shipped"}"#);
        assert_eq!(answer.need_more_info, Flag::False);
    }

    #[test]
    fn malformed_and_unrecognized_are_distinguished() {
        assert!(TaggedPayload::parse("Order 12345 has shipped.").expect_err("text").is_malformed());
        assert!(TaggedPayload::parse("[1,2]").expect_err("array").is_malformed());
        assert!(TaggedPayload::parse(r#"{"type":"clu_result"}"#).expect_err("schema").is_malformed());
        assert!(matches!(
            TaggedPayload::parse(r#"{"answer":"hi"}"#),
            Err(PayloadError::Unrecognized)
        ));
    }

    #[test]
    fn serialization_preserves_wire_field_names() {
        let clu = TaggedPayload::CluResult(CluResult::new(
            vec![Intent { name: "CancelOrder".to_string(), confidence_score: 0.8 }],
            vec![Entity::order_id("19328")],
        ));
        let value = clu.to_value();
        assert_eq!(value["type"], "clu_result");
        assert_eq!(value["terminated"], "False");
        assert_eq!(value["response"]["result"]["conversations"][0]["intents"][0]["confidenceScore"], 0.8);

        let cqa = TaggedPayload::CqaResult(CqaResult::new("30 days", 0.95)).to_value();
        assert_eq!(cqa["response"]["answers"][0]["answer"], "30 days");
        assert_eq!(cqa["terminated"], "True");

        let answer = TaggedPayload::FinalAnswer(FinalAnswer::text("done", true)).to_value();
        assert_eq!(answer["need_more_info"], "True");
        assert!(answer.get("type").is_none());
    }

    #[test]
    fn order_id_matches_name_or_category() {
        let by_name = Entity {
            name: Some("OrderId".to_string()),
            text: Some("0984".to_string()),
            ..Entity::default()
        };
        let unrelated =
            Entity { category: Some("Product".to_string()), text: Some("tent".to_string()), ..Entity::default() };
        assert_eq!(find_order_id(&[unrelated.clone(), by_name]), Some("0984"));
        assert_eq!(find_order_id(&[unrelated]), None);
    }
}
