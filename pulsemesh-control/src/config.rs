use std::str::FromStr;

use tracing::warn;

#[derive(Debug, Clone)]
pub struct ControlConfig {
    pub host: String,
    pub port: u16,
    pub ws_path: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5050,
            ws_path: "/api/ws".to_string(),
        }
    }
}

impl ControlConfig {
    /// Lit la configuration depuis l'environnement, valeurs par défaut si
    /// absentes, valeur par défaut + warn si illisibles.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env_or("PULSEMESH_HOST", &defaults.host),
            port: env_parse("PULSEMESH_PORT", defaults.port),
            ws_path: env_path("PULSEMESH_WS_PATH", &defaults.ws_path),
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

// axum panique au démarrage sur une route sans `/` initial
fn env_path(name: &str, default: &str) -> String {
    match std::env::var(name) {
        Ok(raw) if raw.starts_with('/') => raw,
        Ok(raw) if raw.is_empty() => {
            warn!("empty value for {name}, using default");
            default.to_string()
        }
        Ok(raw) => {
            warn!("missing leading slash in {name}: {raw:?}, normalizing");
            format!("/{raw}")
        }
        Err(_) => default.to_string(),
    }
}

fn env_parse<T: FromStr + Copy>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("invalid value for {name}: {raw:?}, using default");
            default
        }),
        Err(_) => default,
    }
}
