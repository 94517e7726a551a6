use once_cell::sync::Lazy;
use serde::{ Deserialize, Serialize };
use std::fmt;

use super::chat::ChatContext;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
    Boss,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Difficulty::Beginner => "Beginner",
            Difficulty::Intermediate => "Intermediate",
            Difficulty::Advanced => "Advanced",
            Difficulty::Boss => "Boss",
        };
        write!(f, "{}", name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioDescriptor {
    pub id: String,
    pub title: String,
    pub patient_name: String,
    pub difficulty: Difficulty,
    pub skill_reward: u32,
}

impl ScenarioDescriptor {
    fn new(
        id: &str,
        title: &str,
        patient_name: &str,
        difficulty: Difficulty,
        skill_reward: u32
    ) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            patient_name: patient_name.to_string(),
            difficulty,
            skill_reward,
        }
    }

    pub fn context(&self) -> ChatContext {
        ChatContext {
            scenario_id: self.id.clone(),
            patient_name: self.patient_name.clone(),
        }
    }
}

static SCENARIOS: Lazy<Vec<ScenarioDescriptor>> = Lazy::new(|| {
    vec![
        ScenarioDescriptor::new(
            "anxiety-disorder",
            "Generalized Anxiety Disorder",
            "Alex",
            Difficulty::Beginner,
            100
        ),
        ScenarioDescriptor::new(
            "depression",
            "Major Depressive Disorder",
            "Jordan",
            Difficulty::Intermediate,
            150
        ),
        ScenarioDescriptor::new(
            "grief-counseling",
            "Grief Counseling",
            "Morgan",
            Difficulty::Intermediate,
            200
        ),
        ScenarioDescriptor::new(
            "relationship-conflict",
            "Relationship Conflict",
            "Taylor",
            Difficulty::Advanced,
            250
        ),
        ScenarioDescriptor::new(
            "substance-use",
            "Alcohol Use Disorder",
            "Casey",
            Difficulty::Advanced,
            300
        ),
        ScenarioDescriptor::new(
            "bipolar-disorder",
            "Bipolar Disorder",
            "Riley",
            Difficulty::Advanced,
            350
        ),
        ScenarioDescriptor::new("schizophrenia", "Schizophrenia", "Jamie", Difficulty::Boss, 400),
        ScenarioDescriptor::new(
            "borderline-personality",
            "Borderline Personality Disorder",
            "Avery",
            Difficulty::Boss,
            500
        )
    ]
});

pub fn get_scenario(id: &str) -> Option<&'static ScenarioDescriptor> {
    SCENARIOS.iter().find(|s| s.id == id)
}

pub fn all_scenarios() -> &'static [ScenarioDescriptor] {
    &SCENARIOS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schizophrenia_is_a_boss_scenario() {
        let scenario = get_scenario("schizophrenia").expect("scenario exists");
        assert_eq!(scenario.difficulty, Difficulty::Boss);
        assert_eq!(scenario.patient_name, "Jamie");
        assert_eq!(scenario.skill_reward, 400);
    }

    #[test]
    fn unknown_scenario_is_absent() {
        assert!(get_scenario("not-a-scenario").is_none());
        assert!(get_scenario("").is_none());
    }

    #[test]
    fn catalog_ids_are_unique() {
        let mut ids: Vec<&str> = all_scenarios().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids.len(), 8);
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 8);
    }

    #[test]
    fn difficulty_serializes_by_name() {
        let json = serde_json::to_string(&Difficulty::Boss).unwrap();
        assert_eq!(json, "\"Boss\"");
        let anxiety = get_scenario("anxiety-disorder").unwrap();
        assert_eq!(anxiety.context().patient_name, "Alex");
    }
}
