//! Services module
//!
//! Este módulo contiene la lógica de negocio del núcleo de ejecución de rutas:
//! la máquina de estados de paradas, la propagación de estados a jobs y
//! vehículos, el ledger de tracking y el proveedor de geocoding.

pub mod geocoding_service;
pub mod status_propagation_service;
pub mod stop_state_machine;
pub mod tracking_ledger_service;

pub use geocoding_service::{DisabledGeocoder, GeocodingProvider, MapboxGeocoder};
pub use status_propagation_service::{PropagationOutcome, StatusPropagationService};
pub use stop_state_machine::{StopTransition, TransitionContext};
pub use tracking_ledger_service::TrackingLedgerService;
