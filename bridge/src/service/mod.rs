//! Public form processing operations

mod form_service;

pub use form_service::FormProcessingService;
