// Application layer - Core behaviour and collaborator seams
pub mod fix_aggregator;
pub mod logging_service;
pub mod sample_assembler;
pub mod sample_sink;
pub mod sensor_sources;
pub mod tachometer;
