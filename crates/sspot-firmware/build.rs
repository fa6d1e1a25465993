//! Bakes the `.env` settings into the binary and sets up linking.

const REQUIRED: [&str; 4] = ["WIFI_SSID", "WIFI_PASSWORD", "WEB_API_KEY", "DATABASE_URL"];
const OPTIONAL: [&str; 3] = ["SAMPLE_INTERVAL_SECS", "EVICTION_ORDER", "VERIFY_CRC"];

fn main() {
    println!("cargo:rerun-if-changed=.env");

    // Values already in the environment win over the file
    if let Err(e) = dotenvy::dotenv() {
        println!("cargo:warning=No .env file loaded ({e}); relying on the environment");
    }

    for name in REQUIRED {
        println!("cargo:rerun-if-env-changed={name}");
        match std::env::var(name) {
            Ok(value) => println!("cargo:rustc-env={name}={value}"),
            Err(_) => {
                println!("cargo:warning={name} is not set; the device will refuse to start");
                println!("cargo:rustc-env={name}=");
            }
        }
    }

    for name in OPTIONAL {
        println!("cargo:rerun-if-env-changed={name}");
        if let Ok(value) = std::env::var(name) {
            println!("cargo:rustc-env={name}={value}");
        }
    }

    println!("cargo:rustc-link-arg=-Tlinkall.x");
}
