pub mod client;
pub mod home_assistant;
