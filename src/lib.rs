//! Núcleo de ejecución de rutas
//!
//! Ciclo de vida de rutas de transporte de vehículos: máquina de estados de
//! paradas, propagación de estados a TransportJob y Vehicle, y ledger de
//! tracking con cache de trackers activos.

pub mod cache;
pub mod config;
pub mod controllers;
pub mod database;
pub mod dto;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;
