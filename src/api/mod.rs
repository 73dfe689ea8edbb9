//! HTTP API for the medical PDF assistant.
//!
//! # Endpoints
//!
//! - `POST /api/summarize` - Summarise text (`{"text": ...}` → `{"summary": ...}`)
//! - `POST /api/extractOcr` - OCR an uploaded PDF (multipart `pdf` → `{"fullText": ...}`)
//! - `POST /api/process` - Full pipeline on an uploaded PDF → `PipelineRun`
//! - `GET /health` - Health check
//!
//! Requests may carry an `x-session-id` header. A new request with the same
//! session id cancels the one still in flight.
//!
//! # cURL Examples
//!
//! ```bash
//! curl -F "pdf=@labs.pdf" http://localhost:5000/api/process
//! curl -H 'content-type: application/json' -d '{"text":"Hb 11.2 g/dL"}' \
//!      http://localhost:5000/api/summarize
//! ```

mod error;
mod handlers;
mod server;
mod types;

pub use error::{status_for, ApiError};
pub use server::{create_router, serve};
pub use types::{
    ApiState, ErrorResponse, HealthResponse, OcrResponse, ServerConfig, SummarizeRequest,
    SummarizeResponse, SESSION_HEADER,
};
