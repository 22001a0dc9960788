use crate::observations::csv_frame::read_csv_frame;
use crate::observations::error::ObservationError;
use crate::observations::locate_station::{StationFilter, StationLocator, STATION_CACHE_FILE_NAME};
use crate::observations::station::{LatLon, Station};
use crate::session::manager::SessionManager;
use crate::session::transport::{query_params, QueryParams, RawResponse};
use bon::bon;
use chrono::{DateTime, NaiveDate, Utc};
use log::{info, warn};
use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

pub const OBSERVATIONS_BASE_URL: &str = "https://public-api.meteofrance.fr/public/DPObs/v1";

const LIST_STATIONS_PATH: &str = "/liste-stations";
const HOURLY_PATH: &str = "/station/horaire";
const SIX_MINUTES_PATH: &str = "/station/infrahoraire-6m";

const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
const OPENING_DATE_FORMAT: &str = "%Y-%m-%d";

pub const COL_ID: &str = "Id_station";
pub const COL_WMO_ID: &str = "Id_omm";
pub const COL_NAME: &str = "Nom_usuel";
pub const COL_LATITUDE: &str = "Latitude";
pub const COL_LONGITUDE: &str = "Longitude";
pub const COL_ALTITUDE: &str = "Altitude";
pub const COL_OPENED: &str = "Date_ouverture";
pub const COL_PACK: &str = "Pack";

/// Client for the `DPObs` station observation API.
///
/// Observations come back as polars [`DataFrame`]s with the service's own
/// column names (`t` in Kelvin, `u` in %, `ff` in m/s, ...).
pub struct ObservationsClient {
    session: Arc<SessionManager>,
    base_url: String,
    cache_dir: PathBuf,
    locator: Mutex<Option<Arc<StationLocator>>>,
}

#[bon]
impl ObservationsClient {
    pub fn new(session: Arc<SessionManager>, cache_dir: PathBuf) -> Self {
        Self::with_base_url(session, cache_dir, OBSERVATIONS_BASE_URL)
    }

    /// Same as [`Self::new`] against another deployment of the API.
    pub fn with_base_url(
        session: Arc<SessionManager>,
        cache_dir: PathBuf,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            session,
            base_url: base_url.into(),
            cache_dir,
            locator: Mutex::new(None),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// All stations, one row each.
    ///
    /// `Latitude`, `Longitude` and `Altitude` are `Float64`, `Date_ouverture`
    /// is a `Date`; every other column stays a string so identifiers keep their
    /// leading zeros.
    pub fn list_stations(&self) -> Result<DataFrame, ObservationError> {
        let url = format!("{}{}", self.base_url, LIST_STATIONS_PATH);
        let response = self.fetch(&url, &Vec::new())?;
        let raw = read_csv_frame(&response.body, true, &url)?;

        raw.lazy()
            .with_columns([
                col(COL_LATITUDE).cast(DataType::Float64),
                col(COL_LONGITUDE).cast(DataType::Float64),
                col(COL_ALTITUDE).cast(DataType::Float64),
                col(COL_OPENED).str().to_date(StrptimeOptions {
                    format: Some(OPENING_DATE_FORMAT.into()),
                    ..Default::default()
                }),
            ])
            .collect()
            .map_err(ObservationError::StationListConversion)
    }

    /// Latest hourly observations of one station, or those at `datetime`.
    ///
    /// # Arguments
    ///
    /// * `station_id` - The station identifier, e.g. `"75114001"`.
    /// * `.datetime(DateTime<Utc>)` - Observation time. Without it the service
    ///   returns the most recent hour.
    ///
    /// # Errors
    ///
    /// [`crate::SessionError::Parameter`] for an unknown station id, plus the
    /// usual session and CSV errors.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use chrono::{TimeZone, Utc};
    /// use meteofrance::MeteoFrance;
    ///
    /// # fn main() -> Result<(), meteofrance::MeteoFranceError> {
    /// let client = MeteoFrance::from_env()?;
    /// let observations = client.observations();
    /// let hour = observations
    ///     .station_hourly("75114001")
    ///     .datetime(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
    ///     .call()?;
    /// println!("{hour}");
    /// # Ok(())
    /// # }
    /// ```
    #[builder]
    pub fn station_hourly(
        &self,
        #[builder(start_fn)] station_id: &str,
        datetime: Option<DateTime<Utc>>,
    ) -> Result<DataFrame, ObservationError> {
        self.station_observations(HOURLY_PATH, station_id, datetime)
    }

    /// Six-minute observations of one station. Same arguments as
    /// [`Self::station_hourly`].
    #[builder]
    pub fn station_six_minutes(
        &self,
        #[builder(start_fn)] station_id: &str,
        datetime: Option<DateTime<Utc>>,
    ) -> Result<DataFrame, ObservationError> {
        self.station_observations(SIX_MINUTES_PATH, station_id, datetime)
    }

    fn station_observations(
        &self,
        path: &str,
        station_id: &str,
        datetime: Option<DateTime<Utc>>,
    ) -> Result<DataFrame, ObservationError> {
        let url = format!("{}{}", self.base_url, path);
        let mut params = query_params([("id_station", station_id), ("format", "csv")]);
        if let Some(datetime) = datetime {
            params.push((
                "datetime".to_string(),
                datetime.format(DATETIME_FORMAT).to_string(),
            ));
        }
        let response = self.fetch(&url, &params)?;
        read_csv_frame(&response.body, false, &url)
    }

    /// The station list as typed records, read from the artifact cache when present.
    ///
    /// The first call downloads the list and writes it to
    /// `<cache_dir>/stations.bin`.
    pub fn stations(&self) -> Result<Vec<Station>, ObservationError> {
        let cache_file = self.cache_dir.join(STATION_CACHE_FILE_NAME);
        if cache_file.is_file() {
            return StationLocator::load_cached_stations(&cache_file);
        }

        info!("station cache not found, fetching the station list");
        let stations = stations_from_frame(&self.list_stations()?)?;
        std::fs::create_dir_all(&self.cache_dir)
            .map_err(|e| ObservationError::CacheDirCreation(self.cache_dir.clone(), e))?;
        StationLocator::cache_stations(&stations, &cache_file)?;
        Ok(stations)
    }

    fn locator(&self) -> Result<Arc<StationLocator>, ObservationError> {
        let mut slot = self.locator.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(locator) = slot.as_ref() {
            return Ok(locator.clone());
        }
        let locator = Arc::new(StationLocator::new(self.stations()?));
        *slot = Some(locator.clone());
        Ok(locator)
    }

    /// Finds the observation stations nearest to a location.
    ///
    /// # Arguments
    ///
    /// * `.location(LatLon)` - **Required.** The point to search around.
    /// * `.max_distance_km(f64)` - Search radius. Defaults to 50 km.
    /// * `.station_limit(usize)` - Maximum number of results. Defaults to 5.
    /// * `.opened_by(NaiveDate)` - Only stations already open on that date.
    /// * `.pack(String)` - Only stations of that observation pack.
    ///
    /// # Returns
    ///
    /// Stations with their distance in kilometers, nearest first.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use meteofrance::{LatLon, MeteoFrance};
    ///
    /// # fn main() -> Result<(), meteofrance::MeteoFranceError> {
    /// let client = MeteoFrance::from_env()?;
    /// let near_paris = client
    ///     .observations()
    ///     .find_stations()
    ///     .location(LatLon(48.8566, 2.3522))
    ///     .station_limit(3)
    ///     .call()?;
    /// for (station, km) in near_paris {
    ///     println!("{} ({}) {:.1} km", station.name, station.id, km);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    #[builder]
    pub fn find_stations(
        &self,
        location: LatLon,
        max_distance_km: Option<f64>,
        station_limit: Option<usize>,
        opened_by: Option<NaiveDate>,
        #[builder(into)] pack: Option<String>,
    ) -> Result<Vec<(Station, f64)>, ObservationError> {
        let max_distance_km = max_distance_km.unwrap_or(50.0);
        let station_limit = station_limit.unwrap_or(5);
        let filter = StationFilter { opened_by, pack };

        let locator = self.locator()?;
        Ok(locator.query(
            location.0,
            location.1,
            station_limit,
            max_distance_km,
            Some(&filter),
        ))
    }

    fn fetch(&self, url: &str, params: &QueryParams) -> Result<RawResponse, ObservationError> {
        let response = self.session.execute_get(url, params)?;
        if !response.is_success() {
            return Err(ObservationError::UnexpectedStatus {
                url: url.to_string(),
                status: response.status,
                body: response.text(),
            });
        }
        Ok(response)
    }
}

/// Polars stores dates as days since 1970-01-01.
fn date_from_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + 719_163)
}

/// Converts the typed frame from [`ObservationsClient::list_stations`] into
/// [`Station`] records. Rows without coordinates are skipped.
pub fn stations_from_frame(df: &DataFrame) -> Result<Vec<Station>, ObservationError> {
    let conversion = ObservationError::StationListConversion;

    let ids = df.column(COL_ID).map_err(conversion)?.str().map_err(conversion)?;
    let names = df.column(COL_NAME).map_err(conversion)?.str().map_err(conversion)?;
    let latitudes = df.column(COL_LATITUDE).map_err(conversion)?.f64().map_err(conversion)?;
    let longitudes = df.column(COL_LONGITUDE).map_err(conversion)?.f64().map_err(conversion)?;
    let altitudes = df.column(COL_ALTITUDE).map_err(conversion)?.f64().map_err(conversion)?;
    let opened = df.column(COL_OPENED).map_err(conversion)?.date().map_err(conversion)?;
    // Optional columns.
    let wmo_ids = df.column(COL_WMO_ID).ok().and_then(|c| c.str().ok());
    let packs = df.column(COL_PACK).ok().and_then(|c| c.str().ok());

    let mut stations = Vec::with_capacity(df.height());
    for idx in 0..df.height() {
        let Some(id) = ids.get(idx) else {
            warn!("skipping station row {} without an id", idx);
            continue;
        };
        let (Some(latitude), Some(longitude)) = (latitudes.get(idx), longitudes.get(idx)) else {
            warn!("skipping station {} without coordinates", id);
            continue;
        };
        stations.push(Station {
            id: id.to_string(),
            wmo_id: wmo_ids
                .and_then(|c| c.get(idx))
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            name: names.get(idx).unwrap_or_default().to_string(),
            latitude,
            longitude,
            altitude: altitudes.get(idx).unwrap_or(0.0),
            opened: opened.get(idx).and_then(date_from_days),
            pack: packs
                .and_then(|c| c.get(idx))
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        });
    }
    Ok(stations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::credential::Credentials;
    use crate::session::error::SessionError;
    use crate::session::manager::SessionConfig;
    use crate::session::store::MemoryStore;
    use crate::test_utils::{response, ScriptedTransport};
    use chrono::TimeZone;
    use reqwest::Method;
    use tempfile::tempdir;

    const STATION_LIST: &str = "Id_station;Id_omm;Nom_usuel;Latitude;Longitude;Altitude;Date_ouverture;Pack\n\
        75114001;07156;PARIS-MONTSOURIS;48.821667;2.337833;75;1872-01-01;RADOME\n\
        91027002;07149;ORLY;48.716833;2.384333;89;1921-01-01;RADOME\n\
        95088001;07157;ROISSY;49.015;2.534333;108;1974-08-01;RADOME\n\
        01014002;;ARBENT;46.278167;5.669;534;2003-11-01;ETENDU\n";

    const HOURLY: &str = "geo_id_insee;lat;lon;reference_time;insert_time;validity_time;t;td;u\n\
        75114001;48.821667;2.337833;2024-03-01T12:00:00Z;2024-03-01T12:10:52Z;2024-03-01T12:00:00Z;283.65;278.35;71\n";

    fn client(transport: &Arc<ScriptedTransport>, cache_dir: &Path) -> ObservationsClient {
        let config = SessionConfig::builder()
            .store(Arc::new(MemoryStore::new()))
            .build();
        let session =
            SessionManager::new(Credentials::api_key("key"), transport.clone(), config).unwrap();
        ObservationsClient::new(Arc::new(session), cache_dir.to_path_buf())
    }

    fn csv(body: &str) -> RawResponse {
        response(200, "text/csv", body)
    }

    #[test]
    fn station_list_is_typed() {
        let transport = Arc::new(ScriptedTransport::with_responses([csv(STATION_LIST)]));
        let dir = tempdir().unwrap();
        let df = client(&transport, dir.path()).list_stations().unwrap();

        assert_eq!(df.height(), 4);
        assert_eq!(df.column(COL_LATITUDE).unwrap().dtype(), &DataType::Float64);
        assert_eq!(df.column(COL_OPENED).unwrap().dtype(), &DataType::Date);
        let ids = df.column(COL_ID).unwrap().str().unwrap();
        assert_eq!(ids.get(3), Some("01014002"));

        let request = &transport.requests()[0];
        assert_eq!(request.url, format!("{OBSERVATIONS_BASE_URL}/liste-stations"));
        assert!(request.query.is_empty());
    }

    #[test]
    fn frame_to_stations() {
        let transport = Arc::new(ScriptedTransport::with_responses([csv(STATION_LIST)]));
        let dir = tempdir().unwrap();
        let df = client(&transport, dir.path()).list_stations().unwrap();
        let stations = stations_from_frame(&df).unwrap();

        assert_eq!(stations.len(), 4);
        assert_eq!(stations[0].name, "PARIS-MONTSOURIS");
        assert_eq!(stations[0].wmo_id.as_deref(), Some("07156"));
        assert_eq!(stations[0].opened, NaiveDate::from_ymd_opt(1872, 1, 1));
        assert_eq!(stations[3].wmo_id, None);
        assert_eq!(stations[3].pack.as_deref(), Some("ETENDU"));
        assert_eq!(stations[3].altitude, 534.0);
    }

    #[test]
    fn hourly_request_parameters() {
        let transport = Arc::new(ScriptedTransport::with_responses([csv(HOURLY), csv(HOURLY)]));
        let dir = tempdir().unwrap();
        let client = client(&transport, dir.path());

        let latest = client.station_hourly("75114001").call().unwrap();
        assert_eq!(latest.height(), 1);
        let t = latest.column("t").unwrap().f64().unwrap();
        assert_eq!(t.get(0), Some(283.65));

        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        client.station_hourly("75114001").datetime(at).call().unwrap();

        let requests = transport.requests();
        assert_eq!(requests[0].url, format!("{OBSERVATIONS_BASE_URL}/station/horaire"));
        assert_eq!(requests[0].query_values("id_station"), ["75114001"]);
        assert_eq!(requests[0].query_values("format"), ["csv"]);
        assert!(requests[0].query_values("datetime").is_empty());
        assert_eq!(requests[1].query_values("datetime"), ["2024-03-01T12:00:00Z"]);
    }

    #[test]
    fn six_minute_endpoint() {
        let transport = Arc::new(ScriptedTransport::with_responses([csv(HOURLY)]));
        let dir = tempdir().unwrap();
        client(&transport, dir.path())
            .station_six_minutes("75114001")
            .call()
            .unwrap();
        assert_eq!(
            transport.requests()[0].url,
            format!("{OBSERVATIONS_BASE_URL}/station/infrahoraire-6m")
        );
    }

    #[test]
    fn unknown_station_is_a_parameter_error() {
        let fault = "<am:fault xmlns:am=\"http://wso2.org/apimanager\">\
            <am:message>Bad request</am:message>\
            <am:description>id_station is invalid</am:description></am:fault>";
        let transport = Arc::new(ScriptedTransport::with_responses([response(
            400,
            "application/xml",
            fault,
        )]));
        let dir = tempdir().unwrap();
        let err = client(&transport, dir.path())
            .station_hourly("nope")
            .call()
            .unwrap_err();
        match err {
            ObservationError::Session(SessionError::Parameter(fault)) => {
                assert_eq!(fault.description, "id_station is invalid");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn find_stations_caches_the_list() {
        let transport = Arc::new(ScriptedTransport::with_responses([csv(STATION_LIST)]));
        let dir = tempdir().unwrap();

        let client_a = client(&transport, dir.path());
        let nearest = client_a
            .find_stations()
            .location(LatLon(48.8566, 2.3522))
            .station_limit(2)
            .call()
            .unwrap();
        let ids: Vec<_> = nearest.iter().map(|(s, _)| s.id.as_str()).collect();
        assert_eq!(ids, ["75114001", "91027002"]);
        assert!(dir.path().join(STATION_CACHE_FILE_NAME).is_file());

        // A second client reads the bincode cache; the transport has nothing left.
        let client_b = client(&transport, dir.path());
        let extended = client_b
            .find_stations()
            .location(LatLon(46.2, 5.2))
            .max_distance_km(100.0)
            .pack("etendu")
            .call()
            .unwrap();
        assert_eq!(extended.len(), 1);
        assert_eq!(extended[0].0.id, "01014002");
        assert_eq!(transport.count(Method::GET), 1);
    }
}
