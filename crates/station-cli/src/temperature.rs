//! One-shot temperature read for `weatherstation get-temp`.

use station_bus::BusClient;
use station_types::{Reading, Request, Response, StationError, Uid};

/// Ask the Temperature Bricklet `uid` for its current reading in °C.
pub async fn read_temperature(bus: &dyn BusClient, uid: Uid) -> Result<f64, StationError> {
    let request = Request::GetTemperature { uid };
    match bus.request(request.clone()).await? {
        Response::Reading(Reading::Temperature(celsius)) => Ok(celsius),
        other => Err(StationError::request(
            &request,
            format!("unexpected response {other:?}"),
        )),
    }
}

pub fn format_temperature(celsius: f64) -> String {
    format!("Temperature: {celsius:02.2} °C")
}
