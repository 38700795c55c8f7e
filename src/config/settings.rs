use serde::Deserialize;

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub session: SessionSettings,
    pub log: LogSettings,
}

/// Where the broker listens.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BrokerSettings {
    /// Connections accepted beyond this many are closed right away.
    pub max_connections: usize,
}

/// Client-side session: which broker to dial and which worker topics to use.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SessionSettings {
    pub url: String,
    pub conversation_topic: String,
    pub image_topic: String,
    /// Shared status topic. Derived from `conversation_topic` when unset.
    pub resources_topic: Option<String>,
    pub stream: bool,
}

impl SessionSettings {
    pub fn resources_topic(&self) -> String {
        self.resources_topic
            .clone()
            .unwrap_or_else(|| format!("{}-resources", self.conversation_topic))
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub session: Option<PartialSessionSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub max_connections: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialSessionSettings {
    pub url: Option<String>,
    pub conversation_topic: Option<String>,
    pub image_topic: Option<String>,
    pub resources_topic: Option<String>,
    pub stream: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 3030,
            },
            broker: BrokerSettings {
                max_connections: 1000,
            },
            session: SessionSettings {
                url: "ws://127.0.0.1:3030".to_string(),
                conversation_topic: "gpt-oasst-llama2".to_string(),
                image_topic: "sd-2-1".to_string(),
                resources_topic: None,
                stream: true,
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl PartialSettings {
    /// Fill every missing field from `defaults`.
    pub fn merge(self, defaults: Settings) -> Settings {
        let server = self.server;
        let broker = self.broker;
        let session = self.session;
        let log = self.log;

        Settings {
            server: ServerSettings {
                host: server
                    .as_ref()
                    .and_then(|s| s.host.clone())
                    .unwrap_or(defaults.server.host),
                port: server
                    .as_ref()
                    .and_then(|s| s.port)
                    .unwrap_or(defaults.server.port),
            },
            broker: BrokerSettings {
                max_connections: broker
                    .as_ref()
                    .and_then(|b| b.max_connections)
                    .unwrap_or(defaults.broker.max_connections),
            },
            session: SessionSettings {
                url: session
                    .as_ref()
                    .and_then(|s| s.url.clone())
                    .unwrap_or(defaults.session.url),
                conversation_topic: session
                    .as_ref()
                    .and_then(|s| s.conversation_topic.clone())
                    .unwrap_or(defaults.session.conversation_topic),
                image_topic: session
                    .as_ref()
                    .and_then(|s| s.image_topic.clone())
                    .unwrap_or(defaults.session.image_topic),
                resources_topic: session
                    .as_ref()
                    .and_then(|s| s.resources_topic.clone())
                    .or(defaults.session.resources_topic),
                stream: session
                    .as_ref()
                    .and_then(|s| s.stream)
                    .unwrap_or(defaults.session.stream),
            },
            log: LogSettings {
                level: log
                    .as_ref()
                    .and_then(|l| l.level.clone())
                    .unwrap_or(defaults.log.level),
            },
        }
    }
}
