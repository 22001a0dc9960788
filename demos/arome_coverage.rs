use meteofrance::{MeteoFrance, MeteoFranceError, SessionError};
use quick_xml::events::Event;
use quick_xml::Reader;

/// Downloads the 2 m temperature over south-east France from the first
/// temperature coverage listed by the AROME capabilities.
fn main() -> Result<(), MeteoFranceError> {
    let client = MeteoFrance::from_env()?;
    let arome = client.arome()?;

    let capabilities = arome.capabilities()?;
    let Some(coverage_id) =
        first_coverage_id(&capabilities, "TEMPERATURE__SPECIFIC_HEIGHT_LEVEL_ABOVE_GROUND")
    else {
        println!("No temperature coverage currently published");
        return Ok(());
    };
    println!("Using coverage {coverage_id}");

    match arome
        .coverage(&coverage_id)
        .height(2)
        .lat((43.0, 46.0))
        .long((3.0, 8.0))
        .call()
    {
        Ok(path) => println!("GeoTIFF written to {}", path.display()),
        Err(meteofrance::ForecastError::Session(SessionError::MissingData(report))) => {
            println!("No data for this request:\n{report}")
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// The text of the first `CoverageId` element starting with `prefix`.
fn first_coverage_id(capabilities: &str, prefix: &str) -> Option<String> {
    let mut reader = Reader::from_str(capabilities);
    reader.config_mut().trim_text(true);

    let mut in_coverage_id = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) => {
                in_coverage_id = element.local_name().as_ref() == b"CoverageId";
            }
            Ok(Event::Text(text)) if in_coverage_id => {
                let id = text.unescape().ok()?;
                if id.starts_with(prefix) {
                    return Some(id.into_owned());
                }
            }
            Ok(Event::End(_)) => in_coverage_id = false,
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}
