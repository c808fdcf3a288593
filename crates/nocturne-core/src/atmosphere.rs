//! Per-recipient atmosphere: the remembered details of how they like the room.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Atmosphere {
    pub music_preference: Option<String>,
    pub drink: Option<String>,
    pub seat: Option<String>,
    pub weather: Option<String>,
    pub nickname: Option<String>,
}

/// A partial update. Fields left `None` keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AtmospherePatch {
    pub music_preference: Option<String>,
    pub drink: Option<String>,
    pub seat: Option<String>,
    pub weather: Option<String>,
    pub nickname: Option<String>,
}

impl AtmospherePatch {
    pub fn is_empty(&self) -> bool {
        self.music_preference.is_none()
            && self.drink.is_none()
            && self.seat.is_none()
            && self.weather.is_none()
            && self.nickname.is_none()
    }
}

impl Atmosphere {
    pub fn apply(&mut self, patch: &AtmospherePatch) {
        fn take(slot: &mut Option<String>, update: &Option<String>) {
            if let Some(value) = update {
                *slot = Some(value.clone());
            }
        }
        take(&mut self.music_preference, &patch.music_preference);
        take(&mut self.drink, &patch.drink);
        take(&mut self.seat, &patch.seat);
        take(&mut self.weather, &patch.weather);
        take(&mut self.nickname, &patch.nickname);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_keeps_untouched_fields() {
        let mut atm = Atmosphere {
            music_preference: Some("Jazz".into()),
            drink: Some("Negroni".into()),
            ..Default::default()
        };
        atm.apply(&AtmospherePatch {
            music_preference: Some("Fado".into()),
            ..Default::default()
        });
        assert_eq!(atm.music_preference.as_deref(), Some("Fado"));
        assert_eq!(atm.drink.as_deref(), Some("Negroni"));
        assert!(atm.seat.is_none());
    }

    #[test]
    fn test_patch_deserializes_camel_case() {
        let patch: AtmospherePatch = serde_json::from_str(r#"{"musicPreference":"Fado"}"#).unwrap();
        assert_eq!(patch.music_preference.as_deref(), Some("Fado"));
        assert!(!patch.is_empty());
        assert!(AtmospherePatch::default().is_empty());
    }
}
