//! Tank Arena: client-side battle simulation and the room relay it talks to

pub mod app;
pub mod client;
pub mod config;
pub mod game;
pub mod http;
pub mod net;
pub mod relay;
pub mod util;
pub mod ws;
