//! Gaming kill switches
//!
//! Operators (and the integrity monitor) can disable all gaming, a single
//! game or a single player. The orchestrator consults this before a play
//! touches the ledger.

use crate::audit::{AuditContext, AuditEventType, AuditLog, EventSeverity};
use crate::common::traits::{AccessControl, AccessDenied};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlStatus {
    pub gaming_enabled: bool,
    pub disabled_games: Vec<String>,
    pub disabled_players: Vec<String>,
    pub disabled_at: Option<DateTime<Utc>>,
    pub disabled_by: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug)]
struct ControlState {
    gaming_enabled: bool,
    disabled_games: HashSet<String>,
    disabled_players: HashSet<String>,
    disabled_at: Option<DateTime<Utc>>,
    disabled_by: Option<String>,
    reason: Option<String>,
}

pub struct GamingControl {
    state: RwLock<ControlState>,
    audit: AuditLog,
}

impl GamingControl {
    pub fn new(audit: AuditLog) -> Self {
        Self {
            state: RwLock::new(ControlState {
                gaming_enabled: true,
                disabled_games: HashSet::new(),
                disabled_players: HashSet::new(),
                disabled_at: None,
                disabled_by: None,
                reason: None,
            }),
            audit,
        }
    }

    pub async fn disable_all_gaming(&self, reason: &str, disabled_by: &str) {
        {
            let mut state = self.state.write().await;
            state.gaming_enabled = false;
            state.disabled_at = Some(Utc::now());
            state.disabled_by = Some(disabled_by.to_string());
            state.reason = Some(reason.to_string());
        }
        self.audit.log(
            AuditEventType::GamingDisabled,
            EventSeverity::Critical,
            format!("All gaming disabled: {}", reason),
            json!({ "disabled_by": disabled_by, "reason": reason }),
            AuditContext::component("control"),
        );
    }

    pub async fn enable_all_gaming(&self, enabled_by: &str) {
        {
            let mut state = self.state.write().await;
            state.gaming_enabled = true;
            state.disabled_at = None;
            state.disabled_by = None;
            state.reason = None;
        }
        self.audit.log(
            AuditEventType::GamingEnabled,
            EventSeverity::Warning,
            "All gaming re-enabled",
            json!({ "enabled_by": enabled_by }),
            AuditContext::component("control"),
        );
    }

    pub async fn disable_game(&self, game_id: &str, reason: &str) {
        self.state.write().await.disabled_games.insert(game_id.to_string());
        self.audit.log(
            AuditEventType::GameDisabled,
            EventSeverity::Warning,
            format!("Game {} disabled: {}", game_id, reason),
            json!({ "game_id": game_id, "reason": reason }),
            AuditContext::component("control"),
        );
    }

    pub async fn enable_game(&self, game_id: &str) {
        self.state.write().await.disabled_games.remove(game_id);
        self.audit.log(
            AuditEventType::GameEnabled,
            EventSeverity::Info,
            format!("Game {} enabled", game_id),
            json!({ "game_id": game_id }),
            AuditContext::component("control"),
        );
    }

    pub async fn disable_player(&self, player_id: &str, reason: &str) {
        self.state
            .write()
            .await
            .disabled_players
            .insert(player_id.to_string());
        self.audit.log(
            AuditEventType::PlayerDisabled,
            EventSeverity::Warning,
            format!("Player disabled: {}", reason),
            json!({ "reason": reason }),
            AuditContext {
                component: "control".to_string(),
                ..AuditContext::player(player_id)
            },
        );
    }

    pub async fn enable_player(&self, player_id: &str) {
        self.state.write().await.disabled_players.remove(player_id);
        self.audit.log(
            AuditEventType::PlayerEnabled,
            EventSeverity::Info,
            "Player enabled",
            json!({}),
            AuditContext {
                component: "control".to_string(),
                ..AuditContext::player(player_id)
            },
        );
    }

    pub async fn is_gaming_enabled(&self) -> bool {
        self.state.read().await.gaming_enabled
    }

    pub async fn status(&self) -> ControlStatus {
        let state = self.state.read().await;
        let mut disabled_games: Vec<_> = state.disabled_games.iter().cloned().collect();
        let mut disabled_players: Vec<_> = state.disabled_players.iter().cloned().collect();
        disabled_games.sort();
        disabled_players.sort();
        ControlStatus {
            gaming_enabled: state.gaming_enabled,
            disabled_games,
            disabled_players,
            disabled_at: state.disabled_at,
            disabled_by: state.disabled_by.clone(),
            reason: state.reason.clone(),
        }
    }
}

#[async_trait]
impl AccessControl for GamingControl {
    async fn check_access(&self, player_id: &str, game_id: &str) -> Result<(), AccessDenied> {
        let state = self.state.read().await;
        if !state.gaming_enabled {
            return Err(AccessDenied::GamingDisabled {
                reason: state.reason.clone().unwrap_or_default(),
            });
        }
        if state.disabled_games.contains(game_id) {
            return Err(AccessDenied::GameDisabled(game_id.to_string()));
        }
        if state.disabled_players.contains(player_id) {
            return Err(AccessDenied::PlayerDisabled(player_id.to_string()));
        }
        Ok(())
    }
}
