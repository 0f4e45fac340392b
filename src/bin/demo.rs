//! Hardware-free walkthrough: a simulated BMS answers diagnostics and streams
//! its state while the session decodes everything it sees.
//!
//! Run with `RUST_LOG=canbench=debug cargo run --bin canbench-demo`.

use anyhow::Context;
use canbench::{
    BusEvent, BusSession, Frame, PeriodicMessage, ResponseRule, SessionConfig, SignalDatabase, SignalField,
    VirtualBus, pack,
};
use futures::StreamExt;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const BMS_ID: u32 = 0x18F8_1280;
const MCU_ID: u32 = 0x18F8_6890;
const TESTER_ID: u32 = 0x7E0;
const ECU_REPLY_ID: u32 = 0x7E8;

fn signal_database() -> SignalDatabase {
    let mut db = SignalDatabase::new();
    db.insert(BMS_ID, SignalField::new("Voltage", 0, 16, 0.1, "V"));
    db.insert(BMS_ID, SignalField::new("Current", 16, 16, 0.05, "A"));
    db.insert(BMS_ID, SignalField::new("SOC", 32, 8, 1.0, "%"));
    db.insert(BMS_ID, SignalField::new("SOH", 40, 8, 1.0, "%"));
    db.insert(MCU_ID, SignalField::new("Speed", 0, 8, 1.0, "km/h"));
    db.insert(MCU_ID, SignalField::new("Odometer", 8, 24, 1.0, "km"));
    db.insert(MCU_ID, SignalField::new("Gear", 45, 3, 1.0, ""));
    db
}

fn bms_payload(voltage: f64, current: f64, soc: f64, soh: f64) -> anyhow::Result<Vec<u8>> {
    let mut data = vec![0u8; 8];
    pack(&mut data, 0, 16, voltage, 0.1)?;
    pack(&mut data, 16, 16, current, 0.05)?;
    pack(&mut data, 32, 8, soc, 1.0)?;
    pack(&mut data, 40, 8, soh, 1.0)?;
    Ok(data)
}

fn mcu_payload(speed: f64, odometer: f64, gear: f64) -> anyhow::Result<Vec<u8>> {
    let mut data = vec![0u8; 8];
    pack(&mut data, 0, 8, speed, 1.0)?;
    pack(&mut data, 8, 24, odometer, 1.0)?;
    pack(&mut data, 45, 3, gear, 1.0)?;
    Ok(data)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("canbench=info")))
        .init();

    let db = signal_database();
    let bus = VirtualBus::new();
    let session = BusSession::new(bus.clone(), SessionConfig::default());

    session.rules().add(
        ResponseRule::new(TESTER_ID, ECU_REPLY_ID, vec![0x02, 0x7E, 0x00])
            .with_extended(false)
            .with_delay_ms(5)
            .with_comment("TesterPresent ack"),
    )?;
    session.scheduler().add(
        PeriodicMessage::new(BMS_ID, bms_payload(78.4, 12.5, 85.0, 95.0)?)
            .with_cycle_time_ms(100)
            .with_comment("BMS GET_SOC_1"),
    )?;
    session.scheduler().add(
        PeriodicMessage::new(0x18FF_0001, vec![0; 8]).with_cycle_time_ms(250).with_increment_byte(7),
    )?;

    let mut events = Box::pin(session.events());
    session.connect("PCAN_USBBUS1", 500_000).await.context("connecting to the virtual bus")?;

    bus.inject(Frame::new(MCU_ID, mcu_payload(42.0, 1250.0, 3.0)?, true)?);
    bus.inject(Frame::new(TESTER_ID, vec![0x02, 0x3E, 0x00], false)?);

    let watch = async {
        while let Some(event) = events.next().await {
            match event {
                BusEvent::FrameReceived(frame) => {
                    info!("RX {:>8X} {}", frame.id, db.decode(frame.id, &frame.data))
                }
                BusEvent::FrameSent(frame) => {
                    info!("TX {:>8X} {}", frame.id, db.decode(frame.id, &frame.data))
                }
                BusEvent::ConnectionChanged { status, .. } => info!("{status}"),
                BusEvent::Error(message) => warn!("{message}"),
                BusEvent::StatsUpdated(_) => {}
            }
        }
    };
    let _ = tokio::time::timeout(Duration::from_millis(600), watch).await;

    let stats = session.stats();
    info!(
        rx = stats.rx_count,
        tx = stats.tx_count,
        errors = stats.errors,
        status = stats.status(),
        "Bus statistics"
    );

    println!("{}", session.snapshot_profile().to_yaml()?);
    session.disconnect().await?;
    Ok(())
}
