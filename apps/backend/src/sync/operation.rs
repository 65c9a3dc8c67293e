//! Field-level diff between two consecutive views of a game.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::protocol::game_state::GameView;

const SETTINGS_KEY: &str = "settings";
const PLAYERS_KEY: &str = "players";
const PLAYER_ID_KEY: &str = "id";

/// Minimal description of what changed between two versions. Every present
/// member holds absolute values: partial objects are merged field by field,
/// arrays and nested objects inside them replace the previous value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_players: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_players: Option<Vec<Map<String, Value>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_players: Option<Vec<String>>,
}

impl Operation {
    pub fn is_empty(&self) -> bool {
        self.game.is_none()
            && self.settings.is_none()
            && self.add_players.is_none()
            && self.update_players.is_none()
            && self.remove_players.is_none()
    }

    /// Diff two views of the same game.
    pub fn between(before: &GameView, after: &GameView) -> Result<Self, serde_json::Error> {
        let before = into_object(serde_json::to_value(before)?);
        let after = into_object(serde_json::to_value(after)?);
        Ok(Self::between_objects(&before, &after))
    }

    pub(crate) fn between_objects(before: &Map<String, Value>, after: &Map<String, Value>) -> Self {
        let game = changed_fields(before, after, &[SETTINGS_KEY, PLAYERS_KEY]);

        let empty = Map::new();
        let settings = changed_fields(
            object_at(before, SETTINGS_KEY).unwrap_or(&empty),
            object_at(after, SETTINGS_KEY).unwrap_or(&empty),
            &[],
        );

        let old_players = players_at(before);
        let new_players = players_at(after);

        let remove: Vec<String> = old_players
            .iter()
            .filter(|(id, _)| !new_players.iter().any(|(other, _)| other == id))
            .map(|(id, _)| id.to_string())
            .collect();

        let mut add = Vec::new();
        let mut update = Vec::new();
        for (id, player) in &new_players {
            match old_players.iter().find(|(other, _)| other == id) {
                None => add.push(Value::Object((*player).clone())),
                Some((_, previous)) => {
                    if let Some(mut fields) = changed_fields(previous, player, &[PLAYER_ID_KEY]) {
                        fields.insert(PLAYER_ID_KEY.to_string(), Value::String(id.to_string()));
                        update.push(fields);
                    }
                }
            }
        }

        Self {
            game,
            settings,
            add_players: non_empty(add),
            update_players: non_empty(update),
            remove_players: non_empty(remove),
        }
    }
}

fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn object_at<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    map.get(key).and_then(Value::as_object)
}

fn players_at(map: &Map<String, Value>) -> Vec<(&str, &Map<String, Value>)> {
    map.get(PLAYERS_KEY)
        .and_then(Value::as_array)
        .map(|players| {
            players
                .iter()
                .filter_map(Value::as_object)
                .filter_map(|p| Some((p.get(PLAYER_ID_KEY)?.as_str()?, p)))
                .collect()
        })
        .unwrap_or_default()
}

/// Fields of `after` that are new or different from `before`. Fields that
/// vanished are sent as `null`.
fn changed_fields(
    before: &Map<String, Value>,
    after: &Map<String, Value>,
    skip: &[&str],
) -> Option<Map<String, Value>> {
    let mut changed = Map::new();
    for (key, value) in after {
        if skip.contains(&key.as_str()) {
            continue;
        }
        if before.get(key) != Some(value) {
            changed.insert(key.clone(), value.clone());
        }
    }
    for key in before.keys() {
        if !skip.contains(&key.as_str()) && !after.contains_key(key) {
            changed.insert(key.clone(), Value::Null);
        }
    }
    (!changed.is_empty()).then_some(changed)
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    (!items.is_empty()).then_some(items)
}
