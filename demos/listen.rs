//! This example finds a BM77 blood pressure cuff, connects to it and prints
//! every measurement it sends until the cuff disconnects.

use bm77::{ConnectionSession, Error, ScanConfig, Scanner, SessionConfig};
use futures::StreamExt;

#[tokio::main]
async fn main() -> Result<(), Error> {
    pretty_env_logger::init();

    let mut scanner = Scanner::new();
    let device = scanner.find_device(ScanConfig::default()).await?;

    println!("Found cuff at {}", device.address());

    let session = ConnectionSession::establish(&device, SessionConfig::default(), |status| {
        println!("Link is now {:?}", status);
    })
    .await?;

    let mut measurements = session.measurements().await?;

    while let Some(result) = measurements.next().await {
        match result {
            Ok(m) => {
                println!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}  user {}  {}/{} mmHg, pulse {}",
                    m.year,
                    m.month,
                    m.day,
                    m.hours,
                    m.minutes,
                    m.seconds,
                    m.user_id,
                    m.systolic,
                    m.diastolic,
                    m.pulse_rate
                );
                println!(
                    "  {} | {} | {} | {} | {} | {}",
                    m.flags.body_movement,
                    m.flags.cuff_fit,
                    m.flags.irregular_pulse,
                    m.flags.pulse_rate_range,
                    m.flags.measurement_position,
                    m.flags.hsd
                );
            }
            Err(e) => eprintln!("Bad frame: {}", e),
        }
    }

    Ok(())
}
