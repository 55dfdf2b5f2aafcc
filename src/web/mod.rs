//! Interactive dashboard served over HTTP.
//!
//! The graph is rendered once from the frozen snapshot when the `Dashboard`
//! is built; request handling is stateless and only hands out those bytes.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::classify::{classify_record, ChannelStatus};
use crate::registry::RegistrySnapshot;

const TEMPLATE: &str = include_str!("dashboard.html");

/// Id of the node every send and receive edge connects to.
pub const MAIN_NODE: &str = "main";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub group: String,
    pub status: String,
    /// Hover text; vis-network reads it from `title`.
    #[serde(rename = "title")]
    pub tooltip: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebEdge {
    pub from: String,
    pub to: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WebGraph {
    pub nodes: Vec<WebNode>,
    pub edges: Vec<WebEdge>,
}

impl WebGraph {
    pub fn from_snapshot(snapshot: &RegistrySnapshot) -> Self {
        let mut graph = WebGraph::default();
        graph.nodes.push(WebNode {
            id: MAIN_NODE.to_string(),
            label: "Main".to_string(),
            node_type: "program".to_string(),
            group: "main".to_string(),
            status: ChannelStatus::Normal.as_str().to_string(),
            tooltip: "Main program".to_string(),
        });

        for record in snapshot.iter() {
            let status = classify_record(record);
            let mut tooltip = format!(
                "Type: {}\nDeclaration: {}",
                record.type_name(),
                record.declaration
            );
            if let Some(warning) = status.warning() {
                tooltip.push_str("\n\u{26a0} ");
                tooltip.push_str(warning);
            }

            graph.nodes.push(WebNode {
                id: record.name.clone(),
                label: record.name.clone(),
                node_type: record.type_name(),
                group: "channel".to_string(),
                status: status.as_str().to_string(),
                tooltip,
            });

            graph.edges.extend(record.send_sites.iter().map(|_| WebEdge {
                from: MAIN_NODE.to_string(),
                to: record.name.clone(),
                label: "send".to_string(),
            }));
            graph.edges.extend(record.receive_sites.iter().map(|_| WebEdge {
                from: record.name.clone(),
                to: MAIN_NODE.to_string(),
                label: "receive".to_string(),
            }));
        }

        graph
    }
}

/// Pre-rendered dashboard content.
pub struct Dashboard {
    page: Bytes,
    graph_json: Bytes,
}

impl Dashboard {
    pub fn new(graph: &WebGraph) -> serde_json::Result<Self> {
        let nodes = script_safe(serde_json::to_string(&graph.nodes)?);
        let edges = script_safe(serde_json::to_string(&graph.edges)?);
        let page = TEMPLATE
            .replace("{{NODES}}", &nodes)
            .replace("{{EDGES}}", &edges);

        Ok(Self {
            page: Bytes::from(page),
            graph_json: Bytes::from(serde_json::to_vec(graph)?),
        })
    }

    pub fn from_snapshot(snapshot: &RegistrySnapshot) -> serde_json::Result<Self> {
        Self::new(&WebGraph::from_snapshot(snapshot))
    }

    /// Route one request.
    pub fn respond<B>(&self, req: &Request<B>) -> Response<Full<Bytes>> {
        match (req.method(), req.uri().path()) {
            (&Method::GET, "/") => ok(self.page.clone(), "text/html; charset=utf-8"),
            (&Method::GET, "/api/graph") => ok(self.graph_json.clone(), "application/json"),
            _ => {
                let mut response = Response::new(Full::new(Bytes::from_static(b"not found\n")));
                *response.status_mut() = StatusCode::NOT_FOUND;
                response
            }
        }
    }
}

fn ok(body: Bytes, content_type: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Keep embedded JSON from closing the surrounding `<script>` element.
fn script_safe(json: String) -> String {
    json.replace("</", "<\\/")
}

/// Accept connections forever, one task per connection.
pub async fn serve(listener: TcpListener, dashboard: Arc<Dashboard>) -> std::io::Result<()> {
    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Failed to accept connection: {}", e);
                continue;
            }
        };

        let io = TokioIo::new(stream);
        let dashboard = Arc::clone(&dashboard);

        tokio::task::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let dashboard = Arc::clone(&dashboard);
                async move { Ok::<_, Infallible>(dashboard.respond(&req)) }
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                error!("Error serving connection from {}: {}", remote_addr, err);
            }
        });
    }
}

/// Bind `addr` and serve the dashboard until the process is stopped.
pub fn run(addr: SocketAddr, dashboard: Dashboard) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| anyhow::anyhow!("binding {}: {}", addr, e))?;
        let local = listener.local_addr()?;
        info!(address = %local, "dashboard listening");
        println!();
        println!("Starting web server on http://{}", local);
        println!("Open your browser to view the interactive visualization");
        serve(listener, Arc::new(dashboard)).await?;
        Ok::<(), anyhow::Error>(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ChannelRegistry, Declaration, Location, UsageKind};
    use http_body_util::BodyExt;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn snapshot() -> RegistrySnapshot {
        let registry = ChannelRegistry::new();
        for (name, ty) in [("events", "string"), ("quit", "struct{}")] {
            registry.upsert_declaration(Declaration {
                name: name.to_string(),
                element_type: ty.to_string(),
                site: Location::new("main.go", 3),
            });
        }
        registry.append_usage("events", UsageKind::Send, Location::new("main.go", 5));
        registry.append_usage("events", UsageKind::Send, Location::new("main.go", 6));
        registry.append_usage("events", UsageKind::Receive, Location::new("main.go", 9));
        registry.snapshot()
    }

    fn request(method: Method, path: &str) -> Request<()> {
        let mut req = Request::new(());
        *req.method_mut() = method;
        *req.uri_mut() = path.parse().unwrap();
        req
    }

    #[test]
    fn test_graph_from_snapshot() {
        let graph = WebGraph::from_snapshot(&snapshot());

        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.nodes[0].id, MAIN_NODE);

        let events = graph.nodes.iter().find(|n| n.id == "events").unwrap();
        assert_eq!(events.status, "normal");
        assert_eq!(events.node_type, "chan string");

        let quit = graph.nodes.iter().find(|n| n.id == "quit").unwrap();
        assert_eq!(quit.status, "dangling");
        assert!(quit.tooltip.contains("Dangling channel"));

        let sends = graph.edges.iter().filter(|e| e.label == "send").count();
        let receives = graph.edges.iter().filter(|e| e.label == "receive").count();
        assert_eq!((sends, receives), (2, 1));
    }

    #[test]
    fn test_node_json_field_names() {
        let graph = WebGraph::from_snapshot(&snapshot());
        let value = serde_json::to_value(&graph.nodes[1]).unwrap();
        assert!(value.get("title").is_some());
        assert!(value.get("type").is_some());
        assert!(value.get("tooltip").is_none());
    }

    #[test]
    fn test_page_embeds_graph() {
        let dashboard = Dashboard::from_snapshot(&snapshot()).unwrap();
        let page = std::str::from_utf8(&dashboard.page).unwrap();
        assert!(!page.contains("{{NODES}}"));
        assert!(!page.contains("{{EDGES}}"));
        assert!(page.contains("\"id\":\"events\""));
        assert!(page.contains("vis-network"));
    }

    #[test]
    fn test_script_safe() {
        assert_eq!(script_safe("\"</script>\"".to_string()), "\"<\\/script>\"");
    }

    #[tokio::test]
    async fn test_routes() {
        let dashboard = Dashboard::from_snapshot(&snapshot()).unwrap();

        let index = dashboard.respond(&request(Method::GET, "/"));
        assert_eq!(index.status(), StatusCode::OK);
        assert_eq!(
            index.headers()[CONTENT_TYPE],
            HeaderValue::from_static("text/html; charset=utf-8")
        );

        let api = dashboard.respond(&request(Method::GET, "/api/graph"));
        assert_eq!(api.status(), StatusCode::OK);
        let body = api.into_body().collect().await.unwrap().to_bytes();
        let graph: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(graph["nodes"].as_array().unwrap().len(), 3);

        let missing = dashboard.respond(&request(Method::GET, "/static/app.js"));
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let post = dashboard.respond(&request(Method::POST, "/"));
        assert_eq!(post.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_serve_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let dashboard = Arc::new(Dashboard::from_snapshot(&snapshot()).unwrap());
        tokio::spawn(serve(listener, dashboard));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /api/graph HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("application/json"));
        assert!(response.contains("\"events\""));
    }
}
