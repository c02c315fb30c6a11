//! Media Service
//!
//! Small backend offering user registration/login (by email or phone) and
//! authenticated image upload with thumbnail generation. Uploads are
//! validated, staged locally, pushed to S3 together with a derived thumbnail,
//! and recorded in PostgreSQL.
//!
//! ## Architecture
//!
//! ```text
//! Client                     S3 Bucket                 PostgreSQL
//! ┌──────────────┐          ┌──────────────┐          ┌──────────────┐
//! │ POST /v1/file│          │ original     │          │ users        │
//! └──────┬───────┘          │ thumbnail    │          │ files        │
//!        │                  └──────▲───────┘          └──────▲───────┘
//!        ▼                         │                         │
//! ┌──────────────┐          ┌──────┴───────┐          ┌──────┴───────┐
//! │ Auth Gate    │─────────▶│ Ingest       │─────────▶│ Media Store  │
//! └──────────────┘          │ Pipeline     │          └──────────────┘
//!                           └──────────────┘
//! ```
//!
//! Registration and login mint stateless HS256 session tokens; the auth gate
//! verifies them before any protected handler runs.

pub mod account;
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod ingest;
pub mod media_store;
pub mod object_store;
pub mod thumbnail;
pub mod token;
pub mod user_store;

pub use account::{AccountError, AccountService, CredentialSink, Session};
pub use api::AppState;
pub use config::Config;
pub use ingest::{
    IngestError, IngestPipeline, IngestStage, MediaSink, ObjectSink, ReceivedUpload,
};
pub use media_store::{FileRecord, MediaStore};
pub use object_store::{ObjectStore, UploadError};
pub use thumbnail::{make_thumbnail, ThumbnailError};
pub use token::{AuthError, TokenService};
pub use user_store::{Contact, UserRecord, UserStore};
