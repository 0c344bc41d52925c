pub mod hub_routes;
pub mod system_routes;
