#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_net::{Config as NetConfig, StackResources};
use embassy_time::{Duration, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::rng::Rng;
use esp_hal::timer::timg::TimerGroup;
use esp_hal::uart::Uart;
use log::{error, info, warn};
use static_cell::StaticCell;

use sspot_core::app_state::{AppRunState, AppState};
use sspot_core::cloud::{RestDatabase, SessionState};
use sspot_core::pipeline::Context;
use sspot_firmware::clock::{SystemClock, uptime_secs};
use sspot_firmware::net::{HardwareRng, HttpsTransport, sntp};
use sspot_firmware::rs485::{self, Rs485Bus};
use sspot_firmware::{config, wifi};

/// Poll interval while waiting for the network or after giving up
const IDLE_POLL: Duration = Duration::from_secs(1);
const DISABLED_POLL: Duration = Duration::from_secs(60);

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
static NET_RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let hal_config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(hal_config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);
    // TLS record buffers live here
    esp_alloc::psram_allocator!(peripherals.PSRAM, esp_hal::psram);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("SSPOT logger starting");

    let mut app = AppState::new();
    let (config, database_url) = match config::load() {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("{}", e);
            app.set_run_state(AppRunState::Error);
            loop {
                Timer::after(DISABLED_POLL).await;
            }
        }
    };

    // Probe transceiver: UART1 on GPIO20/21, DE+/RE on GPIO4
    let uart = Uart::new(peripherals.UART1, rs485::uart_config())
        .expect("Failed to configure UART1")
        .with_rx(peripherals.GPIO20)
        .with_tx(peripherals.GPIO21)
        .into_async();
    let direction = Output::new(peripherals.GPIO4, Level::Low, OutputConfig::default());
    let bus = Rs485Bus::new(
        uart,
        direction,
        config.sensor.settle_ms,
        config.sensor.read_timeout_ms,
    );

    let radio = RADIO.init(esp_radio::init().expect("Failed to initialize Wi-Fi/BLE controller"));
    let (wifi_controller, interfaces) =
        esp_radio::wifi::new(radio, peripherals.WIFI, Default::default())
            .expect("Failed to initialize Wi-Fi controller");

    let mut seed_rng = HardwareRng::new(Rng::new());
    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        NetConfig::dhcpv4(Default::default()),
        NET_RESOURCES.init(StackResources::new()),
        seed_rng.seed(),
    );

    let wifi_config = wifi::client_config(config.internet.ssid, config.internet.password);
    app.set_run_state(AppRunState::WifiConnecting);
    spawner.spawn(wifi::connection_task(wifi_controller, wifi_config).expect("wifi task"));
    spawner.spawn(wifi::net_task(runner).expect("net task"));

    stack.wait_config_up().await;
    if let Some(ip) = stack.config_v4() {
        info!("Got address {}", ip.address);
    }
    app.set_run_state(AppRunState::WifiConnected);

    app.set_run_state(AppRunState::TimeSyncing);
    let mut clock = SystemClock::new();
    let time = sntp::query(stack, config.time.ntp_server, config.time.timeout_ms).await;
    app.time_known = clock.synchronize(time, &config.time.zone).is_ok();
    if !app.time_known {
        warn!("Continuing without wall-clock time; keys count from the epoch");
    }

    let transport = HttpsTransport::new(stack, HardwareRng::new(Rng::new()));
    let db = RestDatabase::new(transport, database_url);
    let mut ctx = Context::new(bus, db, clock, config.pruner(), config.settings());
    let interval = Duration::from_secs(config.sensor.sample_interval_secs);

    loop {
        if let Some(transition) = ctx.db.poll_session(uptime_secs()) {
            app.on_session(transition);
        }

        match ctx.db.session().state() {
            SessionState::Disabled => {
                app.set_run_state(AppRunState::Disabled);
                Timer::after(DISABLED_POLL).await;
                continue;
            }
            SessionState::Unauthenticated => {
                if !stack.is_config_up() {
                    Timer::after(IDLE_POLL).await;
                    continue;
                }
                app.set_run_state(AppRunState::Authenticating);
                let transition = ctx.db.sign_up(config.cloud.api_key, uptime_secs()).await;
                app.on_session(transition);
                continue;
            }
            SessionState::Ready => app.set_run_state(AppRunState::Logging),
        }

        if !ctx.is_ready() {
            Timer::after(IDLE_POLL).await;
            continue;
        }

        // Outcomes are logged and counted by the cycle itself
        let _ = ctx.run_cycle().await;

        if interval > Duration::from_ticks(0) {
            Timer::after(interval).await;
        }
    }
}
