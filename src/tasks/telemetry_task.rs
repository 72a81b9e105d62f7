use embassy_executor::task;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Receiver;

use mip_balance::telemetry::{header, tick_line, DiagSample};

use crate::usb::{write_chunked, UsbSerial};

/// Console over USB CDC-ACM.
/// Prints the header whenever a terminal opens the port, then one
/// redrawn line per inner-loop tick.
#[task]
pub async fn telemetry_task(
    mut usb_serial: UsbSerial<'static>,
    diag_rx: Receiver<'static, CriticalSectionRawMutex, DiagSample, 1>,
) {
    let mut connected = false;

    loop {
        let sample = diag_rx.receive().await;

        if !usb_serial.dtr() {
            connected = false;
            continue;
        }

        if !connected {
            connected = true;
            let _ = write_chunked(&mut usb_serial, header().as_bytes()).await;
        }

        let _ = usb_serial.write_packet(tick_line(&sample).as_bytes()).await;
    }
}
