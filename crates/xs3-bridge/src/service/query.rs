//! Query service: read requests correlated by `requestId`.

use crate::domain::correlation::CorrelationId;
use crate::domain::error::{BridgeError, BridgeResult};
use crate::domain::mobile::DisengageParams;
use crate::domain::session::SessionSlot;
use crate::domain::topics;
use crate::ipc::waiters::WaiterRegistry;
use crate::ports::transport::{InboundMessage, Transport};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Resource names understood by the query endpoint
pub mod resources {
    pub const IDENTIFICATION_MEDIA: &str = "identification-media";
    pub const IDENTIFICATION_MEDIA_ACCESS_DATA: &str = "identification-media-access-data";
    pub const AUTHORIZATION_PROFILES: &str = "authorization-profiles";
    pub const EVVA_COMPONENTS: &str = "evva-components";
}

/// Page size of the catalogue listings
pub const CATALOGUE_PAGE_LIMIT: u64 = 200;

/// Query parameters, merged over `{pageOffset:0, pageLimit:100, sort:"name"}`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    overrides: Map<String, Value>,
    filters: Vec<Value>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offset(self, offset: u64) -> Self {
        self.set("pageOffset", json!(offset))
    }

    pub fn limit(self, limit: u64) -> Self {
        self.set("pageLimit", json!(limit))
    }

    pub fn sort(self, field: &str) -> Self {
        self.set("sort", json!(field))
    }

    /// Add an equality filter
    pub fn filter_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(json!({
            "field": field,
            "type": "eq",
            "op": "eq",
            "value": value.into(),
        }));
        self
    }

    /// Override an arbitrary parameter
    pub fn set(mut self, key: &str, value: Value) -> Self {
        self.overrides.insert(key.to_string(), value);
        self
    }

    pub fn into_value(self) -> Value {
        let mut params = Map::new();
        params.insert("pageOffset".into(), json!(0));
        params.insert("pageLimit".into(), json!(100));
        params.insert("sort".into(), json!("name"));
        if !self.filters.is_empty() {
            params.insert("filters".into(), Value::Array(self.filters));
        }
        params.extend(self.overrides);
        Value::Object(params)
    }
}

pub struct QueryService {
    transport: Arc<dyn Transport>,
    waiters: Arc<WaiterRegistry>,
    session: Arc<SessionSlot>,
    timeout: Duration,
}

impl QueryService {
    pub fn new(
        transport: Arc<dyn Transport>,
        waiters: Arc<WaiterRegistry>,
        session: Arc<SessionSlot>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            waiters,
            session,
            timeout,
        }
    }

    /// Run one query and return the backend's `response` value.
    ///
    /// Errors: `NotAuthenticated` before any I/O, `RemoteQuery` on an error
    /// reply, `Timeout` when neither reply arrives in time.
    pub async fn query(&self, resource: &str, params: QueryParams) -> BridgeResult<Value> {
        let session = self.session.require()?;
        let request_id = CorrelationId::new();
        let reply_topic = topics::query_reply(&session.user_id);
        let error_topic = topics::error_reply(&session.user_id);

        let waiter = self
            .waiters
            .register(format!("query {resource}"), move |msg: &InboundMessage| {
                (msg.topic == reply_topic || msg.topic == error_topic)
                    && msg
                        .json()
                        .is_some_and(|body| request_id.matches(body.get("requestId")))
            });

        let body = json!({
            "requestId": request_id,
            "token": session.token,
            "resource": resource,
            "params": params.into_value(),
        });
        self.transport
            .publish_json(topics::QUERY_REQUEST, &body)
            .await?;
        debug!(request_id = %request_id, resource, "Published query");

        let reply = waiter.wait(self.timeout).await?;
        let body = reply
            .json()
            .ok_or_else(|| BridgeError::Malformed(format!("query reply on {}", reply.topic)))?;

        if topics::is_error_reply(&reply.topic) {
            let message = error_message(&body);
            warn!(request_id = %request_id, resource, error = %message, "Query failed");
            return Err(BridgeError::RemoteQuery { message });
        }

        debug!(request_id = %request_id, resource, "Query OK");
        Ok(match body {
            Value::Object(mut map) => map.remove("response").unwrap_or(Value::Object(map)),
            other => other,
        })
    }

    /// Best-effort lookup of the medium registered for a hardware fingerprint.
    /// Every failure degrades to `None`.
    pub async fn find_entity_id_by_fingerprint(&self, hardware_id_hex: &str) -> Option<String> {
        if hardware_id_hex.is_empty() {
            return None;
        }
        let params = QueryParams::new()
            .limit(1)
            .filter_eq("hardwareId", hardware_id_hex);
        match self.query(resources::IDENTIFICATION_MEDIA, params).await {
            Ok(response) => extract_rows(&response).first().and_then(row_id),
            Err(e) => {
                warn!(hardware_id = hardware_id_hex, error = %e, "Lookup by hardwareId failed");
                None
            }
        }
    }

    /// Identification-medium row with the given id, or `None` if absent
    pub async fn get_medium(&self, medium_id: &str) -> BridgeResult<Option<Value>> {
        let params = QueryParams::new().limit(500).filter_eq("id", medium_id);
        let response = self.query(resources::IDENTIFICATION_MEDIA, params).await?;
        Ok(extract_rows(&response)
            .into_iter()
            .find(|row| row.get("id").and_then(Value::as_str) == Some(medium_id)))
    }

    pub async fn list_authorization_profiles(&self, offset: u64, limit: u64) -> BridgeResult<Value> {
        self.list(resources::AUTHORIZATION_PROFILES, offset, limit).await
    }

    pub async fn list_identification_media(&self, offset: u64, limit: u64) -> BridgeResult<Value> {
        self.list(resources::IDENTIFICATION_MEDIA, offset, limit).await
    }

    pub async fn list_evva_components(&self, offset: u64, limit: u64) -> BridgeResult<Value> {
        self.list(resources::EVVA_COMPONENTS, offset, limit).await
    }

    async fn list(&self, resource: &str, offset: u64, limit: u64) -> BridgeResult<Value> {
        self.query(resource, QueryParams::new().offset(offset).limit(limit))
            .await
    }

    /// Access-data row of a smartphone medium, keyed by its xs medium id
    pub async fn smartphone_access(&self, xs_medium_id: &str) -> BridgeResult<Option<Value>> {
        let params = QueryParams::new()
            .limit(CATALOGUE_PAGE_LIMIT)
            .filter_eq("identificationMedium.xsMediumId", xs_medium_id);
        let response = self
            .query(resources::IDENTIFICATION_MEDIA_ACCESS_DATA, params)
            .await?;
        let rows = extract_rows(&response);
        let matching = rows.iter().position(|row| {
            row.pointer("/identificationMedium/xsMediumId")
                .and_then(Value::as_str)
                == Some(xs_medium_id)
        });
        Ok(matching
            .map(|i| rows[i].clone())
            .or_else(|| rows.first().cloned()))
    }

    /// Access-data rows, optionally narrowed to one medium id
    pub async fn access_data(&self, medium_id: Option<&str>) -> BridgeResult<Value> {
        let params = match medium_id {
            Some(id) => QueryParams::new().limit(1).filter_eq("id", id),
            None => QueryParams::new(),
        };
        self.query(resources::IDENTIFICATION_MEDIA_ACCESS_DATA, params)
            .await
    }

    /// Smartphone media whose access data is in `state`, e.g. `PENDING`
    pub async fn pending_access_data(&self, state: &str) -> BridgeResult<Value> {
        let params = QueryParams::new().filter_eq("state", state);
        self.query(resources::IDENTIFICATION_MEDIA_ACCESS_DATA, params)
            .await
    }

    /// Offline disengage parameters of a smartphone medium.
    ///
    /// Errors with `NotFound` when the backend has no access data for it.
    pub async fn disengage_params(&self, medium_id: &str) -> BridgeResult<DisengageParams> {
        let response = self.access_data(Some(medium_id)).await?;
        let row = extract_rows(&response)
            .into_iter()
            .next()
            .ok_or_else(|| BridgeError::NotFound("Medium access data not found".into()))?;
        Ok(DisengageParams::from_access_row(&row))
    }
}

/// Rows of a query response.
///
/// The backend wraps pages as `items`, `response.data` or `data`; a list of
/// such pages yields the first non-empty one.
pub fn extract_rows(response: &Value) -> Vec<Value> {
    fn page(part: &Value) -> Option<&Vec<Value>> {
        ["/items", "/response/data", "/data"]
            .iter()
            .find_map(|path| part.pointer(path).filter(|v| !v.is_null()))
            .and_then(Value::as_array)
    }

    match response {
        Value::Array(parts) => parts
            .iter()
            .filter_map(page)
            .find(|rows| !rows.is_empty())
            .cloned()
            .unwrap_or_else(|| {
                if parts.iter().any(|p| page(p).is_some()) {
                    Vec::new()
                } else {
                    parts.clone()
                }
            }),
        other => page(other).cloned().unwrap_or_default(),
    }
}

fn row_id(row: &Value) -> Option<String> {
    row.get("id")
        .or_else(|| row.get("xsMediumId"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn error_message(body: &Value) -> String {
    ["message", "error", "reason"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryTransport, Published};
    use crate::domain::session::Session;
    use tokio::sync::mpsc;

    struct Fixture {
        service: Arc<QueryService>,
        waiters: Arc<WaiterRegistry>,
        outbox: Option<mpsc::UnboundedReceiver<Published>>,
    }

    fn fixture() -> Fixture {
        let (transport, outbox) = InMemoryTransport::new();
        let waiters = Arc::new(WaiterRegistry::new());
        let session = Arc::new(SessionSlot::new());
        session.establish(Session::new("T1", "U1"));
        let service = Arc::new(QueryService::new(
            Arc::new(transport),
            Arc::clone(&waiters),
            session,
            Duration::from_millis(5000),
        ));
        Fixture {
            service,
            waiters,
            outbox: Some(outbox),
        }
    }

    /// Answer the next query with `reply(request) -> (topic, body)`
    fn answer_next<F>(fixture: &mut Fixture, reply: F) -> tokio::task::JoinHandle<Value>
    where
        F: FnOnce(&Value) -> (String, Value) + Send + 'static,
    {
        let mut outbox = fixture.outbox.take().unwrap();
        let waiters = Arc::clone(&fixture.waiters);
        tokio::spawn(async move {
            let request = outbox.recv().await.unwrap().json().unwrap();
            let (topic, body) = reply(&request);
            waiters.dispatch(&InboundMessage::from_json(topic, &body));
            request
        })
    }

    #[test]
    fn test_params_defaults_and_overrides() {
        let value = QueryParams::new()
            .limit(1)
            .filter_eq("hardwareId", "abc")
            .into_value();
        assert_eq!(value["pageOffset"], 0);
        assert_eq!(value["pageLimit"], 1);
        assert_eq!(value["sort"], "name");
        assert_eq!(
            value["filters"],
            json!([{"field": "hardwareId", "type": "eq", "op": "eq", "value": "abc"}])
        );
        assert!(QueryParams::new().into_value().get("filters").is_none());
    }

    #[test]
    fn test_extract_rows_shapes() {
        let rows = json!([{"id": "M1"}]);
        assert_eq!(
            extract_rows(&json!({"items": rows.clone()})),
            rows.as_array().unwrap().clone()
        );
        assert_eq!(extract_rows(&json!({"data": rows.clone()})).len(), 1);
        assert_eq!(extract_rows(&json!({"response": {"data": rows.clone()}})).len(), 1);
        assert_eq!(extract_rows(&json!([{"data": []}, {"items": rows}])).len(), 1);
        assert_eq!(extract_rows(&json!([{"id": "M1"}, {"id": "M2"}])).len(), 2);
        assert!(extract_rows(&json!({"total": 0})).is_empty());
    }

    #[tokio::test]
    async fn test_query_requires_session() {
        let (transport, _rx) = InMemoryTransport::new();
        let service = QueryService::new(
            Arc::new(transport),
            Arc::new(WaiterRegistry::new()),
            Arc::new(SessionSlot::new()),
            Duration::from_millis(5000),
        );
        let err = service
            .query("authorization-profiles", QueryParams::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::NotAuthenticated));
    }

    #[tokio::test]
    async fn test_query_success() {
        let mut fixture = fixture();
        let backend = answer_next(&mut fixture, |req| {
            (
                "xs3/1/U1/q".to_string(),
                json!({"requestId": req["requestId"], "response": {"data": [{"id": "P1"}]}}),
            )
        });

        let response = fixture
            .service
            .list_authorization_profiles(0, 200)
            .await
            .unwrap();
        assert_eq!(response, json!({"data": [{"id": "P1"}]}));

        let request = backend.await.unwrap();
        assert_eq!(request["token"], "T1");
        assert_eq!(request["resource"], "authorization-profiles");
        assert_eq!(request["params"]["pageLimit"], 200);
        assert_eq!(fixture.waiters.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_query_error_reply() {
        let mut fixture = fixture();
        answer_next(&mut fixture, |req| {
            (
                "xs3/1/U1/err".to_string(),
                json!({"requestId": req["requestId"], "message": "unknown resource"}),
            )
        });

        let err = fixture
            .service
            .query("nope", QueryParams::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::RemoteQuery { message } if message == "unknown resource"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_timeout() {
        let fixture = fixture();
        let err = fixture
            .service
            .query("identification-media", QueryParams::new())
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(fixture.waiters.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_reply_for_other_user_is_ignored() {
        let mut fixture = fixture();
        let waiters = Arc::clone(&fixture.waiters);
        let mut outbox = fixture.outbox.take().unwrap();
        tokio::spawn(async move {
            let request = outbox.recv().await.unwrap().json().unwrap();
            let wrong = json!({"requestId": request["requestId"], "response": "wrong"});
            waiters.dispatch(&InboundMessage::from_json("xs3/1/U2/q", &wrong));
            let right = json!({"requestId": request["requestId"], "response": "right"});
            waiters.dispatch(&InboundMessage::from_json("xs3/1/U1/q", &right));
        });

        let response = fixture
            .service
            .query("identification-media", QueryParams::new())
            .await
            .unwrap();
        assert_eq!(response, json!("right"));
    }

    #[tokio::test]
    async fn test_find_by_fingerprint() {
        let mut fixture = fixture();
        let backend = answer_next(&mut fixture, |req| {
            (
                "xs3/1/U1/q".to_string(),
                json!({"requestId": req["requestId"], "response": {"data": [{"id": "M1"}]}}),
            )
        });

        let found = fixture.service.find_entity_id_by_fingerprint("abc").await;
        assert_eq!(found.as_deref(), Some("M1"));
        let request = backend.await.unwrap();
        assert_eq!(request["params"]["pageLimit"], 1);
        assert_eq!(request["params"]["filters"][0]["field"], "hardwareId");
    }

    #[tokio::test(start_paused = true)]
    async fn test_find_by_fingerprint_swallows_failures() {
        let fixture = fixture();
        assert_eq!(fixture.service.find_entity_id_by_fingerprint("abc").await, None);
    }

    #[tokio::test]
    async fn test_get_medium_matches_id() {
        let mut fixture = fixture();
        answer_next(&mut fixture, |req| {
            (
                "xs3/1/U1/q".to_string(),
                json!({"requestId": req["requestId"], "response": {"data": [{"id": "M0"}, {"id": "M1", "authorizationProfileId": "P1"}]}}),
            )
        });

        let medium = fixture.service.get_medium("M1").await.unwrap().unwrap();
        assert_eq!(medium["authorizationProfileId"], "P1");
    }

    #[tokio::test]
    async fn test_pending_access_data_filters_by_state() {
        let mut fixture = fixture();
        let backend = answer_next(&mut fixture, |req| {
            (
                "xs3/1/U1/q".to_string(),
                json!({"requestId": req["requestId"], "response": {"data": []}}),
            )
        });

        fixture.service.pending_access_data("PENDING").await.unwrap();
        let request = backend.await.unwrap();
        assert_eq!(request["resource"], "identification-media-access-data");
        assert_eq!(request["params"]["filters"][0]["field"], "state");
        assert_eq!(request["params"]["filters"][0]["value"], "PENDING");
    }

    #[tokio::test]
    async fn test_disengage_params_not_found() {
        let mut fixture = fixture();
        let backend = answer_next(&mut fixture, |req| {
            (
                "xs3/1/U1/q".to_string(),
                json!({"requestId": req["requestId"], "response": {"data": []}}),
            )
        });

        let err = fixture.service.disengage_params("M9").await.unwrap_err();
        assert!(matches!(err, BridgeError::NotFound(_)));
        assert_eq!(err.status_code(), 404);
        let request = backend.await.unwrap();
        assert_eq!(request["params"]["pageLimit"], 1);
        assert_eq!(request["params"]["filters"][0]["value"], "M9");
    }
}
