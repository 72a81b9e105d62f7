use embassy_stm32::usb_otg::{self, Driver};
use embassy_stm32::{bind_interrupts, peripherals};
use embassy_usb::class::cdc_acm::{CdcAcmClass, State};
use embassy_usb::driver::EndpointError;
use embassy_usb::{Builder, Config, UsbDevice};
use static_cell::StaticCell;

bind_interrupts!(pub struct Irqs {
    OTG_FS => usb_otg::InterruptHandler<peripherals::USB_OTG_FS>;
});

pub type UsbDriver = Driver<'static, peripherals::USB_OTG_FS>;
pub type UsbSerial<'a> = CdcAcmClass<'a, UsbDriver>;

const MAX_PACKET: u16 = 64;

/// Descriptor and endpoint buffers; must outlive the device.
struct UsbBuffers {
    config_desc: [u8; 256],
    bos_desc: [u8; 256],
    control_buf: [u8; 64],
    ep_out: [u8; 256],
}

static BUFFERS: StaticCell<UsbBuffers> = StaticCell::new();
static CDC_STATE: StaticCell<State<'static>> = StaticCell::new();

#[embassy_executor::task]
pub async fn usb_task(mut device: UsbDevice<'static, UsbDriver>) -> ! {
    device.run().await
}

/// Build the CDC-ACM console device. Call once.
pub fn init(
    usb_periph: peripherals::USB_OTG_FS,
    dp: peripherals::PA12,
    dm: peripherals::PA11,
) -> (UsbDevice<'static, UsbDriver>, UsbSerial<'static>) {
    let buffers = BUFFERS.init(UsbBuffers {
        config_desc: [0; 256],
        bos_desc: [0; 256],
        control_buf: [0; 64],
        ep_out: [0; 256],
    });

    let mut driver_config = usb_otg::Config::default();
    driver_config.vbus_detection = false;
    let driver = Driver::new_fs(usb_periph, Irqs, dp, dm, &mut buffers.ep_out, driver_config);

    let mut config = Config::new(0xc0de, 0xcafe);
    config.manufacturer = Some("MiP Rust");
    config.product = Some("MiP Balance Console");
    config.serial_number = Some("00000001");

    let mut builder = Builder::new(
        driver,
        config,
        &mut buffers.config_desc,
        &mut buffers.bos_desc,
        &mut [], // msos_descs
        &mut buffers.control_buf,
    );

    let state = CDC_STATE.init(State::new());
    let class = CdcAcmClass::new(&mut builder, state, MAX_PACKET);
    let usb = builder.build();

    (usb, class)
}

/// Write a payload longer than one packet, ending with a zero-length packet
/// when the last chunk is full so the host flushes it.
pub async fn write_chunked(serial: &mut UsbSerial<'static>, data: &[u8]) -> Result<(), EndpointError> {
    let max = MAX_PACKET as usize;
    for chunk in data.chunks(max) {
        serial.write_packet(chunk).await?;
    }
    if data.len() % max == 0 {
        serial.write_packet(&[]).await?;
    }
    Ok(())
}
