//! MCP server core: routes JSON-RPC requests to tool and resource handlers.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::protocol::messages::{
    CallToolRequest, CallToolResult, InitializeRequest, InitializeResult, ListResourcesResult,
    ListToolsResult, ReadResourceRequest, ReadResourceResult, ResourceContent, ResourceDescription,
    ServerCapabilities, ServerInfo, ToolDescription, ToolResultContent,
};
use crate::protocol::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_VERSION};
use crate::resources;
use crate::state::AppState;
use crate::tools;

pub struct McpServer {
    state: Arc<AppState>,
    initialized: bool,
}

impl McpServer {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state, initialized: false }
    }

    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!("Handling request: {}", request.method);

        if !self.initialized && request.method != "initialize" && request.method != "notifications/initialized" {
            warn!("Rejecting request '{}': server not initialized", request.method);
            return Some(JsonRpcResponse::error(request.id, JsonRpcError::server_not_initialized()));
        }

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "notifications/initialized" => return None,
            "tools/list" => self.handle_tools_list().await,
            "tools/call" => self.handle_tools_call(request.params).await,
            "resources/list" => self.handle_resources_list().await,
            "resources/read" => self.handle_resources_read(request.params).await,
            "ping" => Ok(serde_json::json!({})),
            method => {
                warn!("Unknown method: {}", method);
                Err(JsonRpcError::method_not_found())
            }
        };

        Some(match result {
            Ok(result) => JsonRpcResponse::success(request.id, result),
            Err(error) => JsonRpcResponse::error(request.id, error),
        })
    }

    async fn handle_initialize(
        &mut self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: InitializeRequest = match params {
            Some(p) => serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => InitializeRequest::default(),
        };

        let negotiated_version = if request.protocol_version.as_str() < MCP_VERSION {
            info!("Client requested older protocol version {}, using it", request.protocol_version);
            request.protocol_version.clone()
        } else {
            MCP_VERSION.to_string()
        };

        self.initialized = true;
        info!("MCP session initialized with protocol version {}", negotiated_version);

        let result = InitializeResult {
            protocol_version: negotiated_version,
            server_info: ServerInfo {
                name: "memoria".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: ServerCapabilities {
                tools: Some({
                    let mut map = HashMap::new();
                    map.insert("listChanged".to_string(), serde_json::json!(false));
                    map
                }),
                resources: Some({
                    let mut map = HashMap::new();
                    map.insert("listChanged".to_string(), serde_json::json!(false));
                    map
                }),
                prompts: None,
            },
            instructions: Some(
                "Memoria is a per-project, long-running memory store. Use store_memory to save \
                 durable facts and decisions, search_memory to find relevant ones, and \
                 recall_memory when you already know an id and want its full content plus \
                 access tracking. Memories live per-project: nothing written from one project \
                 is visible from another."
                    .to_string(),
            ),
        };

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    async fn handle_tools_list(&self) -> Result<serde_json::Value, JsonRpcError> {
        let tools = vec![
            ToolDescription {
                name: "store_memory".to_string(),
                description: Some("Store a new memory, deduplicating on content and project.".to_string()),
                input_schema: tools::store_memory::schema(),
            },
            ToolDescription {
                name: "search_memory".to_string(),
                description: Some("Hybrid vector/keyword search over the current project's memories.".to_string()),
                input_schema: tools::search_memory::schema(),
            },
            ToolDescription {
                name: "recall_memory".to_string(),
                description: Some("Fetch a memory by id, recording the access.".to_string()),
                input_schema: tools::recall_memory::schema(),
            },
            ToolDescription {
                name: "get_memory".to_string(),
                description: Some("Read a memory by id without recording an access.".to_string()),
                input_schema: tools::get_memory::schema(),
            },
            ToolDescription {
                name: "update_memory".to_string(),
                description: Some("Patch a memory's content, importance, or tags.".to_string()),
                input_schema: tools::update_memory::schema(),
            },
            ToolDescription {
                name: "delete_memory".to_string(),
                description: Some("Delete a memory.".to_string()),
                input_schema: tools::delete_memory::schema(),
            },
            ToolDescription {
                name: "consolidate_memory".to_string(),
                description: Some("Cluster and merge related memories.".to_string()),
                input_schema: tools::consolidate_memory::schema(),
            },
            ToolDescription {
                name: "link_memories".to_string(),
                description: Some("Record a bidirectional association between two memories.".to_string()),
                input_schema: tools::link_memories::schema(),
            },
            ToolDescription {
                name: "get_stats".to_string(),
                description: Some("Memory counts and health signals for the current project.".to_string()),
                input_schema: tools::get_stats::schema(),
            },
            ToolDescription {
                name: "drill_down".to_string(),
                description: Some("Resolve an ephemeral search-result id back to its memory.".to_string()),
                input_schema: tools::drill_down::schema(),
            },
        ];

        let result = ListToolsResult { tools };
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    async fn handle_tools_call(&self, params: Option<serde_json::Value>) -> Result<serde_json::Value, JsonRpcError> {
        let request: CallToolRequest = match params {
            Some(p) => serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => return Err(JsonRpcError::invalid_params("Missing tool call parameters")),
        };

        let result = match request.name.as_str() {
            "store_memory" => tools::store_memory::execute(&self.state, request.arguments).await,
            "search_memory" => tools::search_memory::execute(&self.state, request.arguments).await,
            "recall_memory" => tools::recall_memory::execute(&self.state, request.arguments).await,
            "get_memory" => tools::get_memory::execute(&self.state, request.arguments).await,
            "update_memory" => tools::update_memory::execute(&self.state, request.arguments).await,
            "delete_memory" => tools::delete_memory::execute(&self.state, request.arguments).await,
            "consolidate_memory" => tools::consolidate_memory::execute(&self.state, request.arguments).await,
            "link_memories" => tools::link_memories::execute(&self.state, request.arguments).await,
            "get_stats" => tools::get_stats::execute(&self.state, request.arguments).await,
            "drill_down" => tools::drill_down::execute(&self.state, request.arguments).await,
            name => {
                return Err(JsonRpcError::method_not_found_with_message(&format!("Unknown tool: {}", name)));
            }
        };

        let response = match result {
            Ok(content) => {
                let call_result = CallToolResult {
                    content: vec![ToolResultContent {
                        content_type: "text".to_string(),
                        text: serde_json::to_string_pretty(&content).unwrap_or_else(|_| content.to_string()),
                    }],
                    is_error: Some(false),
                };
                serde_json::to_value(call_result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
            }
            Err(e) => {
                let call_result = CallToolResult {
                    content: vec![ToolResultContent {
                        content_type: "text".to_string(),
                        text: serde_json::json!({ "error": e }).to_string(),
                    }],
                    is_error: Some(true),
                };
                serde_json::to_value(call_result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
            }
        };

        response
    }

    async fn handle_resources_list(&self) -> Result<serde_json::Value, JsonRpcError> {
        let resources = vec![
            ResourceDescription {
                uri: "memory://stats".to_string(),
                name: "Memory Statistics".to_string(),
                description: Some("Current memory counts and embedding coverage for this project".to_string()),
                mime_type: Some("application/json".to_string()),
            },
            ResourceDescription {
                uri: "memory://recent".to_string(),
                name: "Recent Memories".to_string(),
                description: Some("The 10 most recently stored memories in this project".to_string()),
                mime_type: Some("application/json".to_string()),
            },
        ];

        let result = ListResourcesResult { resources };
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    async fn handle_resources_read(&self, params: Option<serde_json::Value>) -> Result<serde_json::Value, JsonRpcError> {
        let request: ReadResourceRequest = match params {
            Some(p) => serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => return Err(JsonRpcError::invalid_params("Missing resource URI")),
        };

        match resources::read(&self.state, &request.uri).await {
            Ok(text) => {
                let result = ReadResourceResult {
                    contents: vec![ResourceContent {
                        uri: request.uri.clone(),
                        mime_type: Some("application/json".to_string()),
                        text,
                    }],
                };
                serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
            }
            Err(e) => Err(JsonRpcError::internal_error(&e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoria_core::{
        Config, ConnectionPool, DrilldownRegistry, EmbeddingClient, EmbeddingQueue, HotPathManager,
        ProjectContext, SchemaManager, SearchEngine,
    };
    use std::time::Duration;
    use tempfile::TempDir;

    async fn test_state() -> (Arc<AppState>, TempDir) {
        let dir = TempDir::new().unwrap();
        let project = ProjectContext::resolve(Some(dir.path().to_path_buf())).unwrap();
        let schema = SchemaManager::new(dir.path(), project.project_schema());
        let pool = ConnectionPool::open(schema.db_path(), 5, Duration::from_secs(30)).unwrap();
        schema.ensure_schema(&pool).await.unwrap();
        let dimension = schema.recorded_dimension(&pool, project.project_path().to_string_lossy().to_string()).await.unwrap();
        let embedder = EmbeddingClient::new(
            dir.path().join("embeddings.sock"),
            Duration::from_millis(50),
            Duration::from_secs(5),
            Duration::from_millis(200),
        );
        let queue = EmbeddingQueue::new(project.project_schema());
        let search = SearchEngine::new(dimension.unwrap_or(memoria_core::DEFAULT_DIMENSIONS)).unwrap();
        let drilldowns = DrilldownRegistry::new();
        let hotpaths = HotPathManager::new();
        let config = Config::default();

        let state = AppState::new(config, project, pool, schema, embedder, queue, search, drilldowns, hotpaths, dimension);
        (Arc::new(state), dir)
    }

    async fn test_server() -> (McpServer, TempDir) {
        let (state, dir) = test_state().await;
        (McpServer::new(state), dir)
    }

    fn make_request(method: &str, params: Option<serde_json::Value>) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(serde_json::json!(1)),
            method: method.to_string(),
            params,
        }
    }

    #[tokio::test]
    async fn initialize_sets_initialized_flag() {
        let (mut server, _dir) = test_server().await;
        assert!(!server.initialized);

        let request = make_request(
            "initialize",
            Some(serde_json::json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "1.0.0"}
            })),
        );

        let response = server.handle_request(request).await.unwrap();
        assert!(response.result.is_some());
        assert!(response.error.is_none());
        assert!(server.initialized);
    }

    #[tokio::test]
    async fn request_before_initialize_returns_error() {
        let (mut server, _dir) = test_server().await;
        let request = make_request("tools/list", None);
        let response = server.handle_request(request).await.unwrap();

        assert!(response.result.is_none());
        let error = response.error.unwrap();
        assert_eq!(error.code, -32003);
    }

    #[tokio::test]
    async fn initialized_notification_returns_none() {
        let (mut server, _dir) = test_server().await;
        server.handle_request(make_request("initialize", None)).await;
        let response = server.handle_request(make_request("notifications/initialized", None)).await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn tools_list_returns_all_tools() {
        let (mut server, _dir) = test_server().await;
        server.handle_request(make_request("initialize", None)).await;

        let response = server.handle_request(make_request("tools/list", None)).await.unwrap();
        let result = response.result.unwrap();
        let tools = result["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 10);

        for tool in tools {
            assert!(tool["name"].is_string());
            assert!(tool["inputSchema"].is_object());
        }
    }

    #[tokio::test]
    async fn resources_list_returns_resources() {
        let (mut server, _dir) = test_server().await;
        server.handle_request(make_request("initialize", None)).await;

        let response = server.handle_request(make_request("resources/list", None)).await.unwrap();
        let result = response.result.unwrap();
        let uris: Vec<&str> = result["resources"].as_array().unwrap().iter().map(|r| r["uri"].as_str().unwrap()).collect();
        assert!(uris.contains(&"memory://stats"));
        assert!(uris.contains(&"memory://recent"));
    }

    #[tokio::test]
    async fn unknown_method_returns_error() {
        let (mut server, _dir) = test_server().await;
        server.handle_request(make_request("initialize", None)).await;
        let response = server.handle_request(make_request("unknown/method", None)).await.unwrap();
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn unknown_tool_returns_error() {
        let (mut server, _dir) = test_server().await;
        server.handle_request(make_request("initialize", None)).await;
        let request = make_request("tools/call", Some(serde_json::json!({"name": "nonexistent", "arguments": {}})));
        let response = server.handle_request(request).await.unwrap();
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn store_and_recall_round_trip() {
        let (mut server, _dir) = test_server().await;
        server.handle_request(make_request("initialize", None)).await;

        let store_req = make_request(
            "tools/call",
            Some(serde_json::json!({"name": "store_memory", "arguments": {"content": "the build uses cargo workspaces"}})),
        );
        let response = server.handle_request(store_req).await.unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["isError"], serde_json::json!(false));
    }

    #[tokio::test]
    async fn ping_returns_empty_object() {
        let (mut server, _dir) = test_server().await;
        server.handle_request(make_request("initialize", None)).await;
        let response = server.handle_request(make_request("ping", None)).await.unwrap();
        assert_eq!(response.result.unwrap(), serde_json::json!({}));
    }
}
