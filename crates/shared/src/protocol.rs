//! Wire shapes returned by the remote listing/detail API.
//!
//! Every optional field defaults so that a sparse payload still decodes;
//! turning these into canonical values is the mapper's job.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListingResponse {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    #[serde(default)]
    pub results: Vec<NamedResource>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamedResource {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetailResponse {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sprites: Option<SpritesPayload>,
    #[serde(default)]
    pub stats: Vec<StatPayload>,
    #[serde(default)]
    pub moves: Vec<MovePayload>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpritesPayload {
    #[serde(default)]
    pub front_default: Option<String>,
    #[serde(default)]
    pub back_default: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatPayload {
    #[serde(default)]
    pub base_stat: Option<i64>,
    #[serde(default)]
    pub effort: Option<i64>,
    #[serde(default)]
    pub stat: Option<NamedResource>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MovePayload {
    #[serde(default, rename = "move")]
    pub move_: Option<NamedResource>,
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
