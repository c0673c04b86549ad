pub mod health;
pub mod json_response;
pub mod routes;
pub mod updates;
pub mod ws;
