use crate::forecast::error::ForecastError;
use crate::forecast::model::{ModelConfig, WCS_VERSION};
use crate::session::manager::SessionManager;
use crate::session::transport::{query_params, QueryParams, RawResponse};
use bon::bon;
use log::{debug, info};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tempfile::NamedTempFile;

const GET_CAPABILITIES: &str = "GetCapabilities";
const DESCRIBE_COVERAGE: &str = "DescribeCoverage";
const GET_COVERAGE: &str = "GetCoverage";

pub const DEFAULT_HEIGHT: u32 = 2;
pub const DEFAULT_TIME: u32 = 0;
/// Roughly metropolitan France.
pub const DEFAULT_LAT: (f64, f64) = (37.5, 55.4);
pub const DEFAULT_LONG: (f64, f64) = (-12.0, 16.0);

/// Client for one AROME or ARPEGE WCS entry point.
///
/// Obtained through [`crate::MeteoFrance::arome`], [`crate::MeteoFrance::arpege`]
/// or [`crate::MeteoFrance::forecast`]. Coverages are written as GeoTIFF files
/// below `cache_dir/<coverage id>/` and reused on later calls with the same
/// parameters.
pub struct ForecastClient {
    session: Arc<SessionManager>,
    config: ModelConfig,
    cache_dir: PathBuf,
    capabilities: Mutex<Option<String>>,
}

#[bon]
impl ForecastClient {
    pub fn new(session: Arc<SessionManager>, config: ModelConfig, cache_dir: PathBuf) -> Self {
        Self {
            session,
            config,
            cache_dir,
            capabilities: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Raw `GetCapabilities` XML, fetched once per client.
    ///
    /// The document lists every coverage id the entry point currently serves.
    ///
    /// # Errors
    ///
    /// Session errors from the request, or [`ForecastError::UnexpectedStatus`].
    pub fn capabilities(&self) -> Result<String, ForecastError> {
        let mut memo = self
            .capabilities
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(xml) = memo.as_ref() {
            return Ok(xml.clone());
        }

        let url = self.config.operation_url(GET_CAPABILITIES);
        let params = query_params([
            ("service", "WCS"),
            ("version", WCS_VERSION),
            ("language", "eng"),
        ]);
        let xml = self.fetch(&url, &params)?.text();
        *memo = Some(xml.clone());
        Ok(xml)
    }

    /// Raw `DescribeCoverage` XML for one coverage id.
    pub fn describe_coverage(&self, coverage_id: &str) -> Result<String, ForecastError> {
        let url = self.config.operation_url(DESCRIBE_COVERAGE);
        let params = query_params([
            ("service", "WCS"),
            ("version", WCS_VERSION),
            ("coverageid", coverage_id),
        ]);
        Ok(self.fetch(&url, &params)?.text())
    }

    /// Downloads a coverage as a GeoTIFF file and returns its path.
    ///
    /// Nothing is requested when the file for these parameters already exists.
    ///
    /// # Arguments
    ///
    /// * `coverage_id` - A coverage id from [`Self::capabilities`], e.g.
    ///   `TEMPERATURE__SPECIFIC_HEIGHT_LEVEL_ABOVE_GROUND___2024-03-01T00.00.00Z`.
    /// * `.height(u32)` - Height above ground in meters. Defaults to 2.
    /// * `.time(u32)` - Forecast time offset. Defaults to 0.
    /// * `.lat((f64, f64))` - Latitude range. Defaults to [`DEFAULT_LAT`].
    /// * `.long((f64, f64))` - Longitude range. Defaults to [`DEFAULT_LONG`].
    ///
    /// # Errors
    ///
    /// * Session errors, including [`crate::SessionError::MissingData`] when the
    ///   coverage or time step does not exist.
    /// * [`ForecastError::CacheDirCreation`] / [`ForecastError::CacheWrite`] on
    ///   local I/O failures.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use meteofrance::MeteoFrance;
    ///
    /// # fn main() -> Result<(), meteofrance::MeteoFranceError> {
    /// let client = MeteoFrance::builder().api_key("my-key").build()?;
    /// let arome = client.arome()?;
    /// let path = arome
    ///     .coverage("TEMPERATURE__SPECIFIC_HEIGHT_LEVEL_ABOVE_GROUND___2024-03-01T00.00.00Z")
    ///     .height(2)
    ///     .lat((43.0, 46.0))
    ///     .long((3.0, 8.0))
    ///     .call()?;
    /// println!("{}", path.display());
    /// # Ok(())
    /// # }
    /// ```
    #[builder]
    pub fn coverage(
        &self,
        #[builder(start_fn)] coverage_id: &str,
        height: Option<u32>,
        time: Option<u32>,
        lat: Option<(f64, f64)>,
        long: Option<(f64, f64)>,
    ) -> Result<PathBuf, ForecastError> {
        let height = height.unwrap_or(DEFAULT_HEIGHT);
        let time = time.unwrap_or(DEFAULT_TIME);
        let lat = lat.unwrap_or(DEFAULT_LAT);
        let long = long.unwrap_or(DEFAULT_LONG);

        let path = self
            .cache_dir
            .join(coverage_id)
            .join(coverage_file_name(height, time, lat, long));
        if path.is_file() {
            debug!("coverage found in cache: {}", path.display());
            return Ok(path);
        }

        info!("fetching coverage {} into {}", coverage_id, path.display());
        let url = self.config.operation_url(GET_COVERAGE);
        let params = query_params([
            ("service", "WCS".to_string()),
            ("version", WCS_VERSION.to_string()),
            ("coverageid", coverage_id.to_string()),
            ("format", "image/tiff".to_string()),
            ("subset", format!("height({height})")),
            ("subset", format!("time({time})")),
            ("subset", format!("lat({},{})", lat.0, lat.1)),
            ("subset", format!("long({},{})", long.0, long.1)),
            ("geotiff:compression", "DEFLATE".to_string()),
        ]);
        let response = self.fetch(&url, &params)?;
        write_atomically(&path, &response.body)?;
        Ok(path)
    }

    fn fetch(&self, url: &str, params: &QueryParams) -> Result<RawResponse, ForecastError> {
        let response = self.session.execute_get(url, params)?;
        if !response.is_success() {
            return Err(ForecastError::UnexpectedStatus {
                url: url.to_string(),
                status: response.status,
                body: response.text(),
            });
        }
        Ok(response)
    }
}

fn coverage_file_name(height: u32, time: u32, lat: (f64, f64), long: (f64, f64)) -> String {
    format!(
        "{}m_{}Z_{}-{}_{}-{}.tiff",
        height, time, lat.0, lat.1, long.0, long.1
    )
}

/// Writes through a temp file in the target directory, so a reader never sees a
/// half-written coverage.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), ForecastError> {
    let dir = path.parent().ok_or_else(|| {
        ForecastError::CacheWrite(path.to_path_buf(), std::io::ErrorKind::InvalidInput.into())
    })?;
    std::fs::create_dir_all(dir)
        .map_err(|e| ForecastError::CacheDirCreation(dir.to_path_buf(), e))?;

    let mut file = NamedTempFile::new_in(dir)
        .map_err(|e| ForecastError::CacheWrite(path.to_path_buf(), e))?;
    file.write_all(bytes)
        .map_err(|e| ForecastError::CacheWrite(path.to_path_buf(), e))?;
    file.persist(path)
        .map_err(|e| ForecastError::CacheWrite(path.to_path_buf(), e.error))?;
    Ok(())
}
