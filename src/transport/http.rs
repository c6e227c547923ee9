use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use super::{
    FilePart, RequestBody, ServiceRequest, ServiceResponse, Transport, TransportError,
    ORIGINAL_CONTENT_TYPE_HEADER, PASSWORD_HEADER,
};
use crate::config::ServiceConfig;

/// Blocking HTTP transport with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    config: ServiceConfig,
}

impl HttpTransport {
    pub fn new(config: ServiceConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(map_reqwest)?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ServiceConfig { &self.config }
}

impl Transport for HttpTransport {
    fn send(&self, request: ServiceRequest) -> Result<ServiceResponse, TransportError> {
        let url = self.config.endpoint_url(&request.endpoint);
        let mut builder = self.client.post(&url);
        if let Some(password) = &request.password {
            builder = builder.header(PASSWORD_HEADER, password);
        }

        builder = match request.body {
            RequestBody::Multipart { parts, fields } => builder.multipart(build_form(parts, fields)?),
            RequestBody::Json(value) => builder.json(&value),
        };

        debug!(url = %url, "sending service request");
        let resp = builder.send().map_err(map_reqwest)?;

        let status = resp.status().as_u16();
        let header = |name: &str| {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let content_type = header(CONTENT_TYPE.as_str());
        let original_content_type = header(ORIGINAL_CONTENT_TYPE_HEADER);
        let body = resp.bytes().map_err(map_reqwest)?.to_vec();

        debug!(url = %url, status, len = body.len(), content_type = ?content_type, "service responded");
        Ok(ServiceResponse { status, content_type, original_content_type, body })
    }
}

fn build_form(parts: Vec<FilePart>, fields: Vec<(String, String)>) -> Result<Form, TransportError> {
    let mut form = Form::new();
    for p in parts {
        let part = Part::bytes(p.bytes)
            .file_name(p.filename)
            .mime_str(&p.mime)
            .map_err(|e| TransportError::Request(e.to_string()))?;
        form = form.part(p.field, part);
    }
    for (name, value) in fields {
        form = form.text(name, value);
    }
    Ok(form)
}

fn map_reqwest(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::Connection(e.to_string())
    } else {
        TransportError::Request(e.to_string())
    }
}
