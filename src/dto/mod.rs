//! DTOs de la API HTTP

pub mod route_dto;

pub use route_dto::*;
