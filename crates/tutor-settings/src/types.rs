//! Settings type definitions.
//!
//! Every section implements [`Default`] with production values and is marked
//! `#[serde(default)]`, so a settings file only needs the keys it overrides.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root settings type.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TutorSettings {
    pub server: ServerSettings,
    pub generation: GenerationSettings,
    pub transcript: TranscriptSettings,
    pub tutor: TutorBehaviorSettings,
    pub logging: LoggingSettings,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub database_path: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            database_path: tutor_home()
                .join("database")
                .join("tutor.db")
                .to_string_lossy()
                .into_owned(),
        }
    }
}

/// Which generation collaborator to build at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationBackend {
    /// Local `mlx_lm.generate` subprocess.
    Mlx,
    /// OpenAI-compatible `/v1/chat/completions` endpoint.
    ChatCompletions,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationSettings {
    pub backend: GenerationBackend,
    pub model: String,
    pub mlx_binary: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub timeout_ms: u64,
    pub endpoint: String,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            backend: GenerationBackend::Mlx,
            model: "mlx-community/gemma-2-9b-it-4bit".to_string(),
            mlx_binary: "mlx_lm.generate".to_string(),
            max_tokens: 1000,
            temperature: 0.7,
            top_p: 0.9,
            timeout_ms: 60_000,
            endpoint: "http://127.0.0.1:8080/v1/chat/completions".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranscriptSettings {
    pub title: String,
    pub summary_preview_chars: usize,
}

impl Default for TranscriptSettings {
    fn default() -> Self {
        Self {
            title: "Study Notes".to_string(),
            summary_preview_chars: 100,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TutorBehaviorSettings {
    /// Whether new sessions start in scenario (role-play) mode.
    pub interaction_mode_default: bool,
}

impl Default for TutorBehaviorSettings {
    fn default() -> Self {
        Self {
            interaction_mode_default: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: String,
    pub log_to_sqlite: bool,
    pub log_db_path: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_to_sqlite: true,
            log_db_path: tutor_home()
                .join("database")
                .join("tutor-logs.db")
                .to_string_lossy()
                .into_owned(),
        }
    }
}

/// `~/.tutor`, falling back to `/tmp/.tutor` without a HOME.
pub fn tutor_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join(".tutor")
}
