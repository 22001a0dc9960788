use meteofrance::{LatLon, MeteoFrance, MeteoFranceError};

fn main() -> Result<(), MeteoFranceError> {
    let client = MeteoFrance::from_env()?;
    let observations = client.observations();

    let lyon = LatLon(45.7640, 4.8357);
    let stations = observations
        .find_stations()
        .location(lyon)
        .max_distance_km(30.0)
        .station_limit(3)
        .call()?;

    for (station, km) in &stations {
        println!("{:>10} {:<30} {:>6.1} km", station.id, station.name, km);
    }

    if let Some((nearest, _)) = stations.first() {
        let latest = observations.station_hourly(&nearest.id).call()?;
        println!("{latest}");
    }
    Ok(())
}
