use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyDto {
    pub links: Vec<NetworkLinkDto>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkLinkDto {
    pub start_point: String,
    pub end_point: String,
    pub capacity: f64,
}
