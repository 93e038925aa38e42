use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};
use treadlog::{export, FtmsError, JsonStore, Result, TreadmillMonitor};

const SAMPLE_TIMEOUT_MS: u64 = 5_000;
const RECORD_FOR: Duration = Duration::from_secs(15 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("📊 Treadlog Live Monitor Example");
    info!("Searching for FTMS treadmills...");

    let store = JsonStore::new("treadlog-data")?;

    let monitor = match TreadmillMonitor::connect_first(store).await {
        Ok(monitor) => {
            info!("✅ Connected to: {}", monitor.device_info().name);
            monitor
        }
        Err(e) => {
            error!("❌ Failed to connect to device: {}", e);
            return Err(e);
        }
    };

    let start_time = Instant::now();

    while start_time.elapsed() < RECORD_FOR {
        let sample = match monitor.next_sample(SAMPLE_TIMEOUT_MS).await {
            Ok(sample) => sample,
            Err(e) if e.is_decode_error() => {
                warn!("⚠️  Malformed frame skipped: {}", e);
                continue;
            }
            Err(FtmsError::Timeout { .. }) => {
                if monitor.is_connected().await {
                    continue;
                }
                warn!("❌ Device disconnected");
                break;
            }
            Err(e) => {
                warn!("❌ Notification stream ended: {}", e);
                break;
            }
        };

        let session = monitor.session().await;
        let distance = sample
            .distance
            .map_or_else(|| "--".to_string(), |d| d.to_string());
        let elapsed = sample
            .elapsed_time
            .map_or_else(|| "--".to_string(), |t| t.to_string());
        let incline = sample
            .incline
            .map_or_else(|| "--".to_string(), |i| i.to_string());

        println!(
            "Speed {:>6} km/h │ Distance {:>6} m │ Time {:>5} s │ Incline {:>5} │ Max {} km/h",
            sample.speed, distance, elapsed, incline, session.max_speed
        );
    }

    match monitor.save_workout().await {
        Ok(workout) => {
            println!("\n📊 Saved Workout:");
            println!("  Distance: {} m", workout.distance);
            println!("  Time: {} s", workout.elapsed_time);
            println!("  Max Speed: {} km/h", workout.max_speed);
            if let Some(avg) = workout.avg_speed {
                println!("  Avg Speed: {avg} km/h");
            }
        }
        Err(FtmsError::NoData) => warn!("Nothing recorded, no workout saved"),
        Err(e) => error!("❌ Failed to save workout: {}", e),
    }

    // Disconnect
    info!("🔌 Disconnecting...");
    if let Err(e) = monitor.disconnect().await {
        error!("❌ Failed to disconnect: {}", e);
    } else {
        info!("✅ Disconnected successfully");
    }

    let today = chrono::Local::now().date_naive();
    let workouts = monitor.store().workouts()?;
    let csv = export::workouts_csv(&workouts)?;
    if !csv.is_empty() {
        std::fs::write(export::workouts_file_name(today), csv)?;
    }

    let raw = monitor.store().raw_log()?;
    if !raw.is_empty() {
        std::fs::write(export::raw_log_file_name(today), export::raw_log_json(&raw)?)?;
    }

    info!("🎉 Monitoring completed!");
    Ok(())
}
