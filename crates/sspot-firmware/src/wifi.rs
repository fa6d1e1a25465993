//! Wi-Fi station management

use alloc::string::String;

use embassy_net::Runner;
use embassy_time::{Duration, Timer};
use esp_radio::wifi::{
    ClientConfig, ModeConfig, WifiController, WifiDevice, WifiEvent, WifiStaState,
};
use log::{error, info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

pub fn client_config(ssid: &str, password: &str) -> ModeConfig {
    ModeConfig::Client(
        ClientConfig::default()
            .with_ssid(String::from(ssid))
            .with_password(String::from(password)),
    )
}

/// Keep the station associated, reconnecting after every drop
#[embassy_executor::task]
pub async fn connection_task(mut controller: WifiController<'static>, config: ModeConfig) {
    info!("Wi-Fi connection task started");
    loop {
        if esp_radio::wifi::sta_state() == WifiStaState::Connected {
            controller.wait_for_event(WifiEvent::StaDisconnected).await;
            warn!("Wi-Fi disconnected");
            Timer::after(RECONNECT_DELAY).await;
        }

        if !matches!(controller.is_started(), Ok(true)) {
            if let Err(e) = controller.set_config(&config) {
                error!("Wi-Fi configuration rejected: {:?}", e);
                Timer::after(RECONNECT_DELAY).await;
                continue;
            }
            if let Err(e) = controller.start_async().await {
                error!("Wi-Fi start failed: {:?}", e);
                Timer::after(RECONNECT_DELAY).await;
                continue;
            }
            info!("Wi-Fi started in station mode");
        }

        match controller.connect_async().await {
            Ok(()) => info!("Wi-Fi connected"),
            Err(e) => {
                warn!("Wi-Fi connect failed: {:?}", e);
                Timer::after(RECONNECT_DELAY).await;
            }
        }
    }
}

#[embassy_executor::task]
pub async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) -> ! {
    runner.run().await
}
