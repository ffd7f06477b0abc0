//! Runtime configuration
//!
//! Read from the environment with defaults, the same way the server binary
//! reads its port and database path.

use std::time::Duration;

const DEFAULT_VALIDATION_DELAY_MS: u64 = 700;
const DEFAULT_EVENT_BUFFER: usize = 32;
const DEFAULT_BROADCAST_BUFFER: usize = 128;

/// Language of the generic messages the runtime writes on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    Es,
    En,
}

impl Locale {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "es" | "es-es" | "es_es" | "spanish" => Some(Self::Es),
            "en" | "en-us" | "en_us" | "english" => Some(Self::En),
            _ => None,
        }
    }

    /// Shown when the validation pipeline fails unexpectedly
    pub fn server_error(self) -> &'static str {
        match self {
            Self::Es => "Ocurrió un problema con nuestros servidores, intenta luego ¡Lo sentimos!",
            Self::En => "Something went wrong on our servers, please try again later. Sorry!",
        }
    }

    /// Shown when select options cannot be loaded
    pub fn fetch_error(self) -> &'static str {
        match self {
            Self::Es => "Error de servidor",
            Self::En => "Server error",
        }
    }

    /// Used when a validator rejects input without saying why
    pub fn fallback_error(self) -> &'static str {
        "Error"
    }
}

#[derive(Debug, Clone)]
pub struct BotFormConfig {
    /// Fixed pause before validating, for perceived latency
    pub validation_delay: Duration,
    pub event_buffer: usize,
    pub broadcast_buffer: usize,
    pub locale: Locale,
}

impl Default for BotFormConfig {
    fn default() -> Self {
        Self {
            validation_delay: Duration::from_millis(DEFAULT_VALIDATION_DELAY_MS),
            event_buffer: DEFAULT_EVENT_BUFFER,
            broadcast_buffer: DEFAULT_BROADCAST_BUFFER,
            locale: Locale::default(),
        }
    }
}

impl BotFormConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let validation_delay = lookup("BOT_FORM_VALIDATION_DELAY_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(defaults.validation_delay, Duration::from_millis);

        let event_buffer = lookup("BOT_FORM_EVENT_BUFFER")
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.event_buffer);

        let broadcast_buffer = lookup("BOT_FORM_BROADCAST_BUFFER")
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.broadcast_buffer);

        let locale = lookup("BOT_FORM_LOCALE")
            .and_then(|v| Locale::parse(&v))
            .unwrap_or(defaults.locale);

        Self {
            validation_delay,
            event_buffer,
            broadcast_buffer,
            locale,
        }
    }

    #[must_use]
    pub fn with_validation_delay(mut self, delay: Duration) -> Self {
        self.validation_delay = delay;
        self
    }

    #[must_use]
    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }
}
