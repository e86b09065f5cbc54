use log::info;
use shared::{Environment, Player, Rules, ServerInfo, ServerType, DEFAULT_GAME_PORT};

/// What a mock game server reports about itself.
#[derive(Debug, Clone, Default)]
pub struct GameState {
    pub info: ServerInfo,
    pub players: Vec<Player>,
    pub rules: Rules,
}

impl GameState {
    pub fn new(info: ServerInfo) -> Self {
        Self {
            info,
            players: Vec::new(),
            rules: Rules::new(),
        }
    }

    /// A plausible dedicated Linux server running `map`.
    pub fn sample(name: &str, map: &str) -> Self {
        Self::new(ServerInfo {
            protocol: 17,
            name: name.to_string(),
            map: map.to_string(),
            folder: "tf".to_string(),
            game: "Team Fortress".to_string(),
            app_id: 440,
            max_players: 24,
            server_type: ServerType::Dedicated,
            environment: Environment::Linux,
            vac: true,
            version: "8604597".to_string(),
            port: Some(DEFAULT_GAME_PORT),
            keywords: Some("cp,increased_maxplayers".to_string()),
            game_id: Some(440),
            ..ServerInfo::default()
        })
    }

    /// Adds a player and keeps the advertised player count in step.
    pub fn add_player(&mut self, name: &str, score: i32, duration: f32) {
        let index = self.players.len().min(u8::MAX as usize) as u8;
        self.players.push(Player::new(index, name, score, duration));
        self.info.players = self.players.len().min(u8::MAX as usize) as u8;
        info!("Added player {} ({})", index, name);
    }

    pub fn remove_player(&mut self, name: &str) -> bool {
        let before = self.players.len();
        self.players.retain(|p| p.name != name);
        self.info.players = self.players.len().min(u8::MAX as usize) as u8;
        before != self.players.len()
    }

    pub fn set_rule(&mut self, name: &str, value: &str) {
        self.rules.insert(name.to_string(), value.to_string());
    }
}
