// SPDX-License-Identifier: MIT

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::adk::error::{GraphError, PetopetaError};
use crate::adk::model::Message;
use crate::adk::retriever::Document;
use crate::petopeta::assistant::{AgentState, Assistant, InputState, PetRecord, Router as Route};
use crate::petopeta::tools::pets::{PetFilter, NO_PET_FOUND};
use crate::petopeta::workflow::graph::GraphEvent;

pub fn router(assistant: Arc<Assistant>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/graph", get(describe_graph))
        .route("/api/chat", post(chat))
        .route("/api/chat/stream", post(chat_stream))
        .route("/api/pets", get(list_pets).put(put_pet).delete(delete_pet))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(assistant)
}

pub async fn serve(assistant: Arc<Assistant>, port: u16) -> Result<(), PetopetaError> {
    let app = router(assistant);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn describe_graph(State(assistant): State<Arc<Assistant>>) -> Json<Value> {
    let graph = assistant.graph();
    let nodes: Vec<Value> = graph
        .node_ids()
        .iter()
        .map(|id| {
            json!({
                "id": id,
                "edges": graph.edges_from(id),
                "routes": graph.dynamic_targets(id),
            })
        })
        .collect();
    Json(json!({
        "name": graph.name(),
        "entry": graph.entry(),
        "nodes": nodes,
        "schema": graph.schema(),
    }))
}

/// One turn: either the whole history in `messages`, a single `message`, or both
#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl ChatRequest {
    fn into_input(self) -> Option<(InputState, Option<String>)> {
        let mut messages = self.messages;
        if let Some(message) = self.message {
            messages.push(Message::user(message));
        }
        if messages.is_empty() {
            return None;
        }
        Some((InputState { messages }, self.user_id))
    }
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub route: Option<Route>,
    pub pets: Vec<PetRecord>,
    pub documents: Vec<Document>,
    pub messages: Vec<Message>,
}

impl From<AgentState> for ChatResponse {
    fn from(state: AgentState) -> Self {
        Self {
            answer: state.answer,
            route: state.router,
            pets: state.pets,
            documents: state.documents,
            messages: state.messages,
        }
    }
}

fn error_body(e: &GraphError) -> Value {
    json!({ "error": e.to_string(), "node": e.failing_node() })
}

type ApiError = (StatusCode, Json<Value>);

async fn chat(
    State(assistant): State<Arc<Assistant>>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Some((input, user_id)) = payload.into_input() else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "no message given" })),
        ));
    };

    match assistant.chat(input, user_id.as_deref()).await {
        Ok(state) => Ok(Json(state.into())),
        Err(e) => {
            log::error!("Chat failed: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, Json(error_body(&e))))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PutPetRequest {
    pub user_id: String,
    pub pet: PetRecord,
}

#[derive(Debug, Deserialize)]
pub struct DeletePetRequest {
    pub user_id: String,
    #[serde(flatten)]
    pub filter: PetFilter,
}

fn internal_error(e: PetopetaError) -> ApiError {
    log::error!("Pet store failed: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
}

async fn list_pets(
    State(assistant): State<Arc<Assistant>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<PetRecord>>, ApiError> {
    let pets = assistant
        .pets()
        .get_pets(Some(&query.user_id))
        .await
        .map_err(internal_error)?;
    Ok(Json(pets))
}

async fn put_pet(
    State(assistant): State<Arc<Assistant>>,
    Json(payload): Json<PutPetRequest>,
) -> Result<Json<Value>, ApiError> {
    let stored = assistant
        .pets()
        .add_or_update_pet(Some(&payload.user_id), &payload.pet)
        .await
        .map_err(internal_error)?;
    if !stored {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "a pet needs a name and a species" })),
        ));
    }
    Ok(Json(json!({ "stored": true })))
}

async fn delete_pet(
    State(assistant): State<Arc<Assistant>>,
    Json(payload): Json<DeletePetRequest>,
) -> Result<Json<Value>, ApiError> {
    let result = assistant
        .pets()
        .delete_pet(Some(&payload.user_id), &payload.filter)
        .await
        .map_err(internal_error)?;
    if result == NO_PET_FOUND {
        return Err((StatusCode::NOT_FOUND, Json(json!({ "error": result }))));
    }
    Ok(Json(json!({ "result": result })))
}

/// Messages of the streaming endpoint
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamMessage {
    Graph(GraphEvent),
    Answer(ChatResponse),
    Error { error: String, node: Option<String> },
}

fn to_event(message: &StreamMessage) -> Event {
    Event::default()
        .json_data(message)
        .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}

async fn chat_stream(
    State(assistant): State<Arc<Assistant>>,
    Json(payload): Json<ChatRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (events_tx, events_rx) = mpsc::channel(100);
    let (done_tx, done_rx) = oneshot::channel();
    let cancel = CancellationToken::new();
    // dropping the response stream cancels the run
    let guard = cancel.clone().drop_guard();

    tokio::spawn(async move {
        let Some((input, user_id)) = payload.into_input() else {
            let _ = done_tx.send(StreamMessage::Error {
                error: "no message given".to_string(),
                node: None,
            });
            return;
        };

        let config = assistant
            .run_config(user_id.as_deref())
            .with_cancel(cancel)
            .with_events(events_tx);
        log::info!("Starting streaming chat (run {})", config.run_id);
        let result = assistant.invoke(input, &config).await;
        drop(config);

        let message = match result {
            Ok(state) => StreamMessage::Answer(state.into()),
            Err(e) => {
                log::error!("Streaming chat failed: {}", e);
                StreamMessage::Error {
                    error: e.to_string(),
                    node: e.failing_node().map(String::from),
                }
            }
        };
        let _ = done_tx.send(message);
    });

    let graph_events = ReceiverStream::new(events_rx).map(StreamMessage::Graph);
    let done = futures::stream::once(done_rx).filter_map(Result::ok);
    let stream = graph_events.chain(done).map(move |message| {
        let _guard = &guard;
        Ok::<_, Infallible>(to_event(&message))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::error::ModelError;
    use crate::adk::model::{GenerationConfig, Model};
    use crate::adk::retriever::Retriever;
    use crate::adk::store::InMemoryStore;
    use crate::petopeta::assistant::{AgentConfiguration, Collaborators};
    use crate::petopeta::tools::pets::{PetTools, PET_DELETED};
    use async_trait::async_trait;

    /// Classifies everything as general and answers with a fixed text
    struct GeneralModel;

    #[async_trait]
    impl Model for GeneralModel {
        fn name(&self) -> &str {
            "general"
        }

        async fn generate(
            &self,
            _messages: &[Message],
            config: &GenerationConfig,
        ) -> Result<String, ModelError> {
            if config.response_schema.is_some() {
                Ok(r#"{"type": "general", "logic": "small talk"}"#.to_string())
            } else {
                Ok("Cats sleep a lot.".to_string())
            }
        }
    }

    struct NoDocuments;

    #[async_trait]
    impl Retriever for NoDocuments {
        fn name(&self) -> &str {
            "none"
        }

        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<Document>, PetopetaError> {
            Ok(Vec::new())
        }
    }

    fn assistant() -> Arc<Assistant> {
        let model: Arc<dyn Model> = Arc::new(GeneralModel);
        Arc::new(
            Assistant::new(Collaborators {
                query_model: model.clone(),
                response_model: model,
                retriever: Arc::new(NoDocuments),
                pets: PetTools::new(Arc::new(InMemoryStore::new())),
                config: AgentConfiguration::default(),
            })
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_health_check() {
        let Json(body) = health_check().await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_chat() {
        let request = ChatRequest {
            message: Some("Why do cats sleep so much?".to_string()),
            ..Default::default()
        };
        let Json(response) = chat(State(assistant()), Json(request)).await.unwrap();

        assert_eq!(response.answer, "Cats sleep a lot.");
        assert_eq!(response.messages.len(), 2);
        assert_eq!(response.route.map(|r| r.logic), Some("small talk".to_string()));
    }

    #[tokio::test]
    async fn test_chat_without_message() {
        let (status, _) = chat(State(assistant()), Json(ChatRequest::default()))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_describe_graph() {
        let Json(body) = describe_graph(State(assistant())).await;
        assert_eq!(body["name"], "petopeta");
        assert_eq!(body["entry"][0], "analyze_and_route_query");
        assert_eq!(body["nodes"].as_array().map(Vec::len), Some(7));
        assert_eq!(body["schema"]["fields"][0]["name"], "messages");
        assert_eq!(body["schema"]["fields"][0]["reducer"], "append");
        assert_eq!(body["schema"]["fields"][2]["reducer"], "replace_by_key");
    }

    fn rex() -> PetRecord {
        PetRecord::named("Rex", "Dog")
    }

    #[tokio::test]
    async fn test_pet_records_round_trip_over_http() {
        let assistant = assistant();

        let Json(body) = put_pet(
            State(assistant.clone()),
            Json(PutPetRequest {
                user_id: "u1".to_string(),
                pet: rex(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(body["stored"], true);

        let query = UserQuery {
            user_id: "u1".to_string(),
        };
        let Json(pets) = list_pets(State(assistant.clone()), Query(query)).await.unwrap();
        assert_eq!(pets, vec![rex()]);

        let request: DeletePetRequest =
            serde_json::from_value(json!({ "user_id": "u1", "name": "Rex" })).unwrap();
        let Json(body) = delete_pet(State(assistant.clone()), Json(request)).await.unwrap();
        assert_eq!(body["result"], PET_DELETED);

        let query = UserQuery {
            user_id: "u1".to_string(),
        };
        let Json(pets) = list_pets(State(assistant), Query(query)).await.unwrap();
        assert!(pets.is_empty());
    }

    #[tokio::test]
    async fn test_delete_unknown_pet() {
        let request: DeletePetRequest =
            serde_json::from_value(json!({ "user_id": "u1", "species": "Cat" })).unwrap();
        let (status, _) = delete_pet(State(assistant()), Json(request)).await.unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_put_pet_without_species() {
        let request = PutPetRequest {
            user_id: "u1".to_string(),
            pet: PetRecord {
                name: Some("Rex".to_string()),
                ..Default::default()
            },
        };
        let (status, _) = put_pet(State(assistant()), Json(request)).await.unwrap_err();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_stream_message_format() {
        let message = StreamMessage::Graph(GraphEvent::Finished {
            graph: "petopeta".to_string(),
            waves: 2,
        });
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "graph");
        assert_eq!(json["event"], "finished");
    }
}
