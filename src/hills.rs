//! Database of British and Irish Hills (DoBIH).
//!
//! The hill database is published as a zipped CSV at hills-database.co.uk.
//! Only the columns the summit tooling needs are kept: DoBIH number, name,
//! coordinates, and height in metres. Rows missing any of these are dropped.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::Path;

use log::{debug, info};
use serde::Deserialize;

use crate::error::{Result, RouteToolError};

/// Download URL for the zipped hill database CSV.
pub const HILL_ZIP_URL: &str = "https://www.hills-database.co.uk/hillcsv.zip";

/// One hill from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct Hill {
    pub number: u32,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub metres: f64,
}

/// Raw CSV row; the database carries many more columns, serde skips them.
#[derive(Debug, Deserialize)]
struct HillRecord {
    #[serde(rename = "Number")]
    number: Option<u32>,
    #[serde(rename = "Name")]
    name: Option<String>,
    #[serde(rename = "Latitude")]
    latitude: Option<f64>,
    #[serde(rename = "Longitude")]
    longitude: Option<f64>,
    #[serde(rename = "Metres")]
    metres: Option<f64>,
}

/// In-memory hill database with number and name lookup.
#[derive(Debug, Default)]
pub struct HillDb {
    hills: Vec<Hill>,
    by_number: HashMap<u32, usize>,
}

impl HillDb {
    /// Parse the database from CSV content.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

        let mut hills = Vec::new();
        let mut by_number = HashMap::new();
        let mut dropped = 0usize;

        for record in csv_reader.deserialize::<HillRecord>() {
            let record = record?;
            match (
                record.number,
                record.name,
                record.latitude,
                record.longitude,
                record.metres,
            ) {
                (Some(number), Some(name), Some(latitude), Some(longitude), Some(metres)) => {
                    by_number.insert(number, hills.len());
                    hills.push(Hill {
                        number,
                        name,
                        latitude,
                        longitude,
                        metres,
                    });
                }
                _ => dropped += 1,
            }
        }

        if hills.is_empty() {
            return Err(RouteToolError::HillData {
                message: "no usable rows in hill CSV".to_string(),
            });
        }

        debug!("Loaded {} hills ({} rows dropped)", hills.len(), dropped);
        Ok(Self { hills, by_number })
    }

    /// Load the database from a local CSV file.
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|err| RouteToolError::Io {
            message: format!("cannot read {}: {}", path.display(), err),
        })?;
        Self::from_csv_reader(file)
    }

    /// Extract the first CSV member from a zip archive and parse it.
    pub fn from_zip_bytes(bytes: &[u8]) -> Result<Self> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;

        let csv_index = (0..archive.len()).find(|&i| {
            archive
                .by_index(i)
                .map(|f| f.name().to_ascii_lowercase().ends_with(".csv"))
                .unwrap_or(false)
        });

        let Some(index) = csv_index else {
            return Err(RouteToolError::HillData {
                message: "no CSV file found in the zip archive".to_string(),
            });
        };

        let mut content = String::new();
        archive.by_index(index)?.read_to_string(&mut content)?;
        Self::from_csv_reader(content.as_bytes())
    }

    /// Download the zipped database and parse it.
    pub async fn download(client: &reqwest::Client, url: &str) -> Result<Self> {
        info!("Downloading hill database from {}", url);
        let bytes = client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        info!("Downloaded {} bytes", bytes.len());
        Self::from_zip_bytes(&bytes)
    }

    pub fn len(&self) -> usize {
        self.hills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hills.is_empty()
    }

    /// Exact DoBIH-number lookup.
    pub fn get(&self, number: u32) -> Option<&Hill> {
        self.by_number.get(&number).map(|&i| &self.hills[i])
    }

    /// Case-insensitive, diacritic-folded substring search, falling back to
    /// an exact (folded) match when no substring match exists.
    pub fn search_by_name(&self, name: &str, max_results: usize) -> Vec<&Hill> {
        let needle = normalise_name(name);
        if needle.is_empty() {
            return Vec::new();
        }

        let mut matches: Vec<&Hill> = self
            .hills
            .iter()
            .filter(|h| normalise_name(&h.name).contains(&needle))
            .take(max_results)
            .collect();

        if matches.is_empty() {
            matches = self
                .hills
                .iter()
                .filter(|h| normalise_name(&h.name) == needle)
                .take(max_results)
                .collect();
        }

        matches
    }
}

/// Lowercase and strip the diacritics that occur in British and Irish hill
/// names, so "Beinn Sgulaird" matches "Sgùrr"-style spellings either way.
pub fn normalise_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            'à' | 'á' | 'â' | 'ä' => 'a',
            'è' | 'é' | 'ê' | 'ë' => 'e',
            'ì' | 'í' | 'î' | 'ï' => 'i',
            'ò' | 'ó' | 'ô' | 'ö' => 'o',
            'ù' | 'ú' | 'û' | 'ü' => 'u',
            'ŵ' => 'w',
            'ŷ' => 'y',
            'À' | 'Á' | 'Â' | 'Ä' => 'a',
            'È' | 'É' | 'Ê' | 'Ë' => 'e',
            'Ì' | 'Í' | 'Î' | 'Ï' => 'i',
            'Ò' | 'Ó' | 'Ô' | 'Ö' => 'o',
            'Ù' | 'Ú' | 'Û' | 'Ü' => 'u',
            'Ŵ' => 'w',
            'Ŷ' => 'y',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_CSV: &str = "\
Number,Name,Latitude,Longitude,Metres,Feet,Section
278,Ben Nevis,56.796891,-5.003675,1344.5,4411,4A
2283,Scafell Pike,54.454222,-3.211556,978.07,3209,34B
2346,Sgùrr na Banachdich,57.2321,-6.2412,965,3166,17B
9999,Broken Row,,,,,
";

    fn sample_db() -> HillDb {
        HillDb::from_csv_reader(SAMPLE_CSV.as_bytes()).unwrap()
    }

    #[test]
    fn test_load_drops_incomplete_rows() {
        let db = sample_db();
        assert_eq!(db.len(), 3);
        assert!(db.get(9999).is_none());
    }

    #[test]
    fn test_get_by_number() {
        let db = sample_db();
        let hill = db.get(278).unwrap();
        assert_eq!(hill.name, "Ben Nevis");
        assert!((hill.metres - 1344.5).abs() < 1e-9);
    }

    #[test]
    fn test_search_by_name_substring() {
        let db = sample_db();
        let matches = db.search_by_name("scafell", 5);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].number, 2283);
    }

    #[test]
    fn test_search_folds_diacritics() {
        let db = sample_db();
        // ASCII query finds the accented name
        let matches = db.search_by_name("sgurr na banachdich", 5);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].number, 2346);
    }

    #[test]
    fn test_search_respects_max_results() {
        let db = sample_db();
        let matches = db.search_by_name("e", 2);
        assert!(matches.len() <= 2);
    }

    #[test]
    fn test_search_empty_query() {
        let db = sample_db();
        assert!(db.search_by_name("   ", 5).is_empty());
    }

    #[test]
    fn test_empty_csv_is_error() {
        let result = HillDb::from_csv_reader("Number,Name,Latitude,Longitude,Metres\n".as_bytes());
        assert!(result.is_err());
    }

    #[test]
    fn test_normalise_name() {
        assert_eq!(normalise_name("  Sgùrr Mòr "), "sgurr mor");
        assert_eq!(normalise_name("Y Ŵyddfa"), "y wyddfa");
    }
}
