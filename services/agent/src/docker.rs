//! Docker Engine API client.
//!
//! Talks to the engine over its Unix socket. Only the calls the reconciler
//! needs are implemented: list, pull, create, start and remove.
//!
//! Reference: https://docs.docker.com/engine/api/v1.41/

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use hearth_model::NetworkProtocol;
use hyper::{Body, Client, Method, Request, StatusCode};
use hyperlocal::{UnixClientExt, UnixConnector, Uri};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use url::form_urlencoded;

use crate::runtime::{
    publish_key, ContainerFilter, ContainerRuntime, ContainerSpec, ContainerSummary, PublishedPort,
    RuntimeError,
};

const API_VERSION: &str = "v1.41";

/// Docker runtime over the engine's Unix socket.
pub struct DockerRuntime {
    socket_path: PathBuf,
    client: Client<UnixConnector>,
}

impl DockerRuntime {
    pub fn new<P: AsRef<Path>>(socket_path: P) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            client: Client::unix(),
        }
    }

    /// Check if the socket exists.
    pub fn socket_exists(&self) -> bool {
        self.socket_path.exists()
    }

    fn uri(&self, path: &str, query: &[(&str, &str)]) -> hyper::Uri {
        let mut path_and_query = format!("/{API_VERSION}{path}");
        if !query.is_empty() {
            let encoded = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(query)
                .finish();
            path_and_query.push('?');
            path_and_query.push_str(&encoded);
        }
        Uri::new(&self.socket_path, &path_and_query).into()
    }

    /// Send a request and return status and full body.
    async fn send(
        &self,
        method: Method,
        uri: hyper::Uri,
        body: Option<Vec<u8>>,
    ) -> Result<(StatusCode, Vec<u8>), RuntimeError> {
        debug!(method = %method, uri = %uri, "Docker API request");

        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("Accept", "application/json");
        let body = match body {
            Some(bytes) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(bytes)
            }
            None => Body::empty(),
        };

        let response = self.client.request(builder.body(body)?).await?;
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await?.to_vec();

        Ok((status, bytes))
    }

    fn api_error(status: StatusCode, body: &[u8]) -> RuntimeError {
        let message = serde_json::from_slice::<ErrorBody>(body)
            .map(|e| e.message)
            .unwrap_or_else(|_| String::from_utf8_lossy(body).to_string());
        error!(status = %status, message = %message, "Docker API error");
        RuntimeError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn list_containers(
        &self,
        filter: &ContainerFilter,
    ) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let filters = encode_filters(filter)?;
        let uri = self.uri("/containers/json", &[("all", "true"), ("filters", &filters)]);

        let (status, body) = self.send(Method::GET, uri, None).await?;
        if !status.is_success() {
            return Err(Self::api_error(status, &body));
        }

        let listed: Vec<DockerContainer> = serde_json::from_slice(&body)?;
        Ok(listed.into_iter().map(ContainerSummary::from).collect())
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        let (from_image, tag) = split_image(image);
        let uri = self.uri("/images/create", &[("fromImage", from_image), ("tag", tag)]);

        info!(image, "Pulling image");
        let (status, body) = self.send(Method::POST, uri, None).await?;
        if !status.is_success() {
            return Err(Self::api_error(status, &body));
        }

        // The engine reports pull failures inside the progress stream.
        if let Some(message) = pull_stream_error(&body) {
            return Err(RuntimeError::Pull {
                image: image.to_string(),
                message,
            });
        }

        debug!(image, "Image pulled");
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let uri = self.uri("/containers/create", &[("name", &spec.name)]);
        let body = serde_json::to_vec(&CreateContainerBody::from(spec))?;

        let (status, body) = self.send(Method::POST, uri, Some(body)).await?;
        if !status.is_success() {
            return Err(Self::api_error(status, &body));
        }

        let created: CreateContainerResponse = serde_json::from_slice(&body)?;
        for warning in created.warnings.iter().flatten() {
            debug!(id = %created.id, warning = %warning, "Container create warning");
        }
        Ok(created.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        let uri = self.uri(&format!("/containers/{id}/start"), &[]);
        let (status, body) = self.send(Method::POST, uri, None).await?;

        // 304: already started.
        if status.is_success() || status == StatusCode::NOT_MODIFIED {
            Ok(())
        } else if status == StatusCode::NOT_FOUND {
            Err(RuntimeError::NotFound(id.to_string()))
        } else {
            Err(Self::api_error(status, &body))
        }
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), RuntimeError> {
        let force = if force { "true" } else { "false" };
        let uri = self.uri(&format!("/containers/{id}"), &[("force", force)]);
        let (status, body) = self.send(Method::DELETE, uri, None).await?;

        if status.is_success() {
            Ok(())
        } else if status == StatusCode::NOT_FOUND {
            Err(RuntimeError::NotFound(id.to_string()))
        } else {
            Err(Self::api_error(status, &body))
        }
    }
}

/// Encode a filter as the engine's `filters` JSON map.
fn encode_filters(filter: &ContainerFilter) -> Result<String, RuntimeError> {
    let mut filters: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    if !filter.labels.is_empty() {
        filters.insert("label", filter.labels.iter().map(String::as_str).collect());
    }
    if let Some(publish) = &filter.publish {
        filters.insert("publish", vec![publish.as_str()]);
    }
    Ok(serde_json::to_string(&filters)?)
}

/// Split `repo[:tag]` into repository and tag, defaulting to `latest`.
///
/// A colon before the last `/` belongs to a registry port, not a tag.
fn split_image(image: &str) -> (&str, &str) {
    let name_start = image.rfind('/').map(|i| i + 1).unwrap_or(0);
    match image[name_start..].rfind(':') {
        Some(i) => {
            let split = name_start + i;
            (&image[..split], &image[split + 1..])
        }
        None => (image, "latest"),
    }
}

fn pull_stream_error(body: &[u8]) -> Option<String> {
    String::from_utf8_lossy(body)
        .lines()
        .filter_map(|line| serde_json::from_str::<PullProgress>(line).ok())
        .find_map(|p| p.error)
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct PullProgress {
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DockerContainer {
    id: String,
    #[serde(default)]
    names: Vec<String>,
    #[serde(default)]
    image: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    labels: Option<BTreeMap<String, String>>,
    #[serde(default)]
    ports: Vec<DockerPort>,
}

#[derive(Debug, Deserialize)]
struct DockerPort {
    #[serde(rename = "IP", default)]
    ip: Option<String>,
    #[serde(rename = "PrivatePort")]
    private_port: u16,
    #[serde(rename = "PublicPort", default)]
    public_port: Option<u16>,
    #[serde(rename = "Type")]
    protocol: String,
}

impl From<DockerContainer> for ContainerSummary {
    fn from(c: DockerContainer) -> Self {
        let mut ports: Vec<PublishedPort> = Vec::new();
        for p in c.ports {
            let protocol = match p.protocol.as_str() {
                "udp" => NetworkProtocol::Udp,
                "tcp" => NetworkProtocol::Tcp,
                _ => continue,
            };
            let port = PublishedPort {
                ip: p.ip.filter(|ip| !ip.is_empty()),
                private_port: p.private_port,
                public_port: p.public_port,
                protocol,
            };
            // The engine lists a binding once per address family.
            if !ports.iter().any(|q| {
                q.private_port == port.private_port
                    && q.protocol == port.protocol
                    && q.public_port == port.public_port
            }) {
                ports.push(port);
            }
        }

        ContainerSummary {
            name: c
                .names
                .first()
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_default(),
            id: c.id,
            image: c.image,
            state: c.state,
            labels: c.labels.unwrap_or_default(),
            ports,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreateContainerBody {
    image: String,
    env: Vec<String>,
    labels: BTreeMap<String, String>,
    exposed_ports: HashMap<String, EmptyObject>,
    host_config: HostConfig,
}

#[derive(Debug, Serialize)]
struct EmptyObject {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct HostConfig {
    port_bindings: HashMap<String, Vec<HostPortBinding>>,
    memory: u64,
    memory_reservation: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct HostPortBinding {
    host_ip: String,
    host_port: String,
}

impl From<&ContainerSpec> for CreateContainerBody {
    fn from(spec: &ContainerSpec) -> Self {
        let mut exposed_ports = HashMap::new();
        let mut port_bindings: HashMap<String, Vec<HostPortBinding>> = HashMap::new();
        for binding in &spec.port_bindings {
            let key = publish_key(binding.container_port, binding.protocol);
            exposed_ports.insert(key.clone(), EmptyObject {});
            port_bindings.entry(key).or_default().push(HostPortBinding {
                host_ip: binding.host_ip.clone(),
                host_port: binding.host_port.to_string(),
            });
        }

        Self {
            image: spec.image.clone(),
            env: spec.env.clone(),
            labels: spec.labels.clone(),
            exposed_ports,
            host_config: HostConfig {
                port_bindings,
                memory: spec.memory_limit_bytes,
                memory_reservation: spec.memory_reservation_bytes,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateContainerResponse {
    id: String,
    #[serde(default)]
    warnings: Option<Vec<String>>,
}
