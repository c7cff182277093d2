// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod csv_sink;
#[cfg(feature = "gpio")]
pub mod gpio_edge_source;
pub mod nmea_decoder;
pub mod nmea_reader;
pub mod serial_gas_sensor;
