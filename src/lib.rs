// Dynamic value model shared by every module
pub mod variant;

// Event model and name registries
pub mod event;

// Ordered publish/subscribe hub
pub mod hub;

// Rules engine and rule document parsing
pub mod rules;

// Rule bundle download and cache
pub mod bundle;

// Configuration
pub mod config;
