//! Client for the electoral authority's public acta directory.
//!
//! The directory is a REST tree walked level by level:
//!
//! ```text
//! {base}/{level}/{dep}/municipios
//! {base}/{level}/{dep}/{mun}/zonas
//! {base}/{level}/{dep}/{mun}/{zone}/puestos
//! {base}/{level}/{dep}/{mun}/{zone}/{center}/mesas
//! ```
//!
//! Intermediate levels return `{id, descripcion}` entries; the leaf returns
//! one entry per mesa with its document reference in `nombre_archivo`.
//! Every mesa is kept, including those with no published document, so the
//! batch can report them as `NO_DOCUMENT`.

use crate::error::ActaError;
use crate::model::UnitDescriptor;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tracing::{debug, info};

/// Public results API for the 2025 general election.
pub const DEFAULT_BASE_URL: &str = "https://resultadosgenerales2025-api.cne.hn/esc/v1/actas-documentos";

/// Election level `01`: presidential.
pub const DEFAULT_LEVEL: &str = "01";

/// One node of the directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DirectoryEntry {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub descripcion: String,
}

/// One table as listed by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MesaInfo {
    #[serde(default)]
    pub numero: u32,
    #[serde(default, deserialize_with = "string_or_number")]
    pub id_informacion_mesa_corporacion: String,
    #[serde(default)]
    pub nombre_archivo: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub etiquetas: Vec<String>,
    #[serde(default)]
    pub publicada: Option<i64>,
    #[serde(default)]
    pub escrutado: Option<bool>,
    #[serde(default)]
    pub digitalizado: Option<i64>,
}

impl MesaInfo {
    /// Unit descriptor labelled with the display names of its ancestors.
    pub fn into_unit(self, department: &str, municipality: &str, zone: &str, center: &str) -> UnitDescriptor {
        UnitDescriptor {
            department: department.to_string(),
            municipality: municipality.to_string(),
            zone: zone.to_string(),
            center: center.to_string(),
            table_number: self.numero,
            unit_id: self.id_informacion_mesa_corporacion,
            document: self.nombre_archivo.filter(|r| !r.trim().is_empty()),
            tags: self.etiquetas,
        }
    }
}

/// Async JSON client over the directory tree.
pub struct DirectoryClient {
    client: reqwest::Client,
    base_url: String,
    level: String,
}

impl DirectoryClient {
    pub fn new(base_url: impl Into<String>, level: impl Into<String>, timeout_secs: u64) -> Result<Self, ActaError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ActaError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            level: level.into(),
        })
    }

    /// Client for the presidential level of the public API.
    pub fn presidential() -> Result<Self, ActaError> {
        Self::new(DEFAULT_BASE_URL, DEFAULT_LEVEL, 60)
    }

    fn url(&self, segments: &[&str]) -> String {
        let mut url = format!("{}/{}", self.base_url, self.level);
        for s in segments {
            url.push('/');
            url.push_str(s);
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, ActaError> {
        debug!("GET {}", url);
        let directory_err = |reason: String| ActaError::Directory {
            url: url.clone(),
            reason,
        };
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| directory_err(e.to_string()))?;
        if !response.status().is_success() {
            return Err(directory_err(format!("HTTP {}", response.status())));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| directory_err(format!("invalid JSON: {e}")))
    }

    pub async fn municipalities(&self, dep: &str) -> Result<Vec<DirectoryEntry>, ActaError> {
        self.get_json(self.url(&[dep, "municipios"])).await
    }

    pub async fn zones(&self, dep: &str, mun: &str) -> Result<Vec<DirectoryEntry>, ActaError> {
        self.get_json(self.url(&[dep, mun, "zonas"])).await
    }

    pub async fn centers(&self, dep: &str, mun: &str, zone: &str) -> Result<Vec<DirectoryEntry>, ActaError> {
        self.get_json(self.url(&[dep, mun, zone, "puestos"])).await
    }

    pub async fn mesas(&self, dep: &str, mun: &str, zone: &str, center: &str) -> Result<Vec<MesaInfo>, ActaError> {
        self.get_json(self.url(&[dep, mun, zone, center, "mesas"])).await
    }

    /// Walk every municipality, zone and center of department `dep`.
    ///
    /// `dep_name` labels the department on every unit. Any failed request
    /// aborts the crawl.
    pub async fn collect_units(&self, dep: &str, dep_name: &str) -> Result<Vec<UnitDescriptor>, ActaError> {
        let mut units = Vec::new();
        for mun in self.municipalities(dep).await? {
            for zone in self.zones(dep, &mun.id).await? {
                for center in self.centers(dep, &mun.id, &zone.id).await? {
                    let mesas = self.mesas(dep, &mun.id, &zone.id, &center.id).await?;
                    debug!(
                        "{} / {} / {}: {} mesas",
                        mun.descripcion,
                        zone.descripcion,
                        center.descripcion,
                        mesas.len()
                    );
                    units.extend(mesas.into_iter().map(|m| {
                        m.into_unit(dep_name, &mun.descripcion, &zone.descripcion, &center.descripcion)
                    }));
                }
            }
        }
        info!("Mesas to process in {}: {}", dep_name, units.len());
        Ok(units)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubServer;

    #[test]
    fn builds_tree_urls() {
        let c = DirectoryClient::new("https://api.example/actas/", "01", 5).unwrap();
        assert_eq!(c.url(&["04", "municipios"]), "https://api.example/actas/01/04/municipios");
        assert_eq!(
            c.url(&["04", "1", "2", "3", "mesas"]),
            "https://api.example/actas/01/04/1/2/3/mesas"
        );
    }

    #[test]
    fn parses_entries_with_numeric_ids() {
        let raw = r#"[{"id": 12, "descripcion": "SANTA RITA"}, {"id": "013", "descripcion": "COPÁN RUINAS"}]"#;
        let entries: Vec<DirectoryEntry> = serde_json::from_str(raw).unwrap();
        assert_eq!(entries[0].id, "12");
        assert_eq!(entries[1].id, "013");
        assert_eq!(entries[1].descripcion, "COPÁN RUINAS");
    }

    #[test]
    fn parses_mesa_and_maps_to_unit() {
        let raw = r#"[
            {"publicada": 1, "numero": 1204, "escrutado": true, "digitalizado": 1,
             "id_informacion_mesa_corporacion": "A-1204",
             "nombre_archivo": "https://cdn.example/actas/1204.pdf",
             "etiquetas": ["escrutada"]},
            {"numero": 1205, "id_informacion_mesa_corporacion": 99,
             "nombre_archivo": "", "etiquetas": null}
        ]"#;
        let mesas: Vec<MesaInfo> = serde_json::from_str(raw).unwrap();
        assert_eq!(mesas.len(), 2);

        let published = mesas[0].clone().into_unit("COPÁN", "SANTA RITA", "URBANA", "ESCUELA");
        assert_eq!(published.table_number, 1204);
        assert_eq!(published.unit_id, "A-1204");
        assert!(published.has_document());
        assert_eq!(published.tags, vec!["escrutada".to_string()]);

        let missing = mesas[1].clone().into_unit("COPÁN", "SANTA RITA", "URBANA", "ESCUELA");
        assert_eq!(missing.unit_id, "99");
        assert_eq!(missing.document, None);
        assert!(missing.tags.is_empty());
    }

    fn directory_tree(path: &str) -> (u16, Vec<u8>) {
        let body: &str = if path.ends_with("/municipios") {
            r#"[{"id": 1, "descripcion": "SANTA ROSA DE COPÁN"}]"#
        } else if path.ends_with("/zonas") {
            r#"[{"id": "2", "descripcion": "URBANA"}]"#
        } else if path.ends_with("/puestos") {
            r#"[{"id": 3, "descripcion": "ESCUELA"}]"#
        } else if path.ends_with("/mesas") {
            r#"[{"numero": 7, "id_informacion_mesa_corporacion": "A-7",
                 "nombre_archivo": "acta7.pdf", "etiquetas": ["escrutada"]},
                {"numero": 8, "id_informacion_mesa_corporacion": 8,
                 "nombre_archivo": null, "etiquetas": null}]"#
        } else {
            return (404, b"not found".to_vec());
        };
        (200, body.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn collects_units_from_the_tree() {
        let server = StubServer::start(directory_tree);
        let client = DirectoryClient::new(server.base(), "01", 5).unwrap();

        let units = client.collect_units("04", "COPÁN").await.unwrap();

        // municipios, zonas, puestos, mesas
        assert_eq!(server.hits(), 4);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].department, "COPÁN");
        assert_eq!(units[0].municipality, "SANTA ROSA DE COPÁN");
        assert_eq!(units[0].zone, "URBANA");
        assert_eq!(units[0].center, "ESCUELA");
        assert_eq!(units[0].document.as_deref(), Some("acta7.pdf"));
        assert_eq!(units[1].unit_id, "8");
        assert!(!units[1].has_document());
    }

    #[tokio::test]
    async fn failed_level_aborts_the_crawl() {
        let server = StubServer::scripted(vec![(503, "busy")]);
        let client = DirectoryClient::new(server.base(), "01", 5).unwrap();
        let err = client.collect_units("04", "COPÁN").await.unwrap_err();
        assert!(matches!(err, ActaError::Directory { .. }));
        assert!(err.to_string().contains("503"), "got: {err}");
    }

    #[tokio::test]
    async fn malformed_json_is_a_directory_error() {
        let server = StubServer::scripted(vec![(200, "<html>maintenance</html>")]);
        let client = DirectoryClient::new(server.base(), "01", 5).unwrap();
        let err = client.municipalities("04").await.unwrap_err();
        assert!(err.to_string().contains("invalid JSON"), "got: {err}");
    }
}
