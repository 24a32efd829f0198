//! Parquet result output.

use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;

use crate::driver::RunOutcome;
use crate::matrix::BenchConfig;

pub struct BenchRow {
    pub benchmark: String,
    pub transport: String,
    pub client_mutator: String,
    pub server_mutator: String,
    pub request_size: u64,
    pub response_size: u64,
    pub iterations: u64,
    pub elapsed_ns: u64,
    pub bytes_processed: u64,
    pub rps: f64,
}

pub fn row_from_outcome(cfg: &BenchConfig, outcome: &RunOutcome) -> BenchRow {
    let elapsed_ns = outcome.elapsed.as_nanos() as u64;
    let elapsed_secs = elapsed_ns as f64 / 1_000_000_000.0;
    BenchRow {
        benchmark: cfg.name(),
        transport: cfg.transport.label().to_string(),
        client_mutator: cfg.client_mutator.label(),
        server_mutator: cfg.server_mutator.label(),
        request_size: cfg.request_size as u64,
        response_size: cfg.response_size as u64,
        iterations: outcome.iterations,
        elapsed_ns,
        bytes_processed: outcome.bytes_processed,
        rps: if elapsed_secs > 0.0 {
            outcome.iterations as f64 / elapsed_secs
        } else {
            0.0
        },
    }
}

pub fn write_parquet(path: &str, rows: &[BenchRow]) -> Result<(), Box<dyn std::error::Error>> {
    if rows.is_empty() {
        return Ok(());
    }

    let schema = Arc::new(Schema::new(vec![
        Field::new("benchmark", DataType::Utf8, false),
        Field::new("transport", DataType::Utf8, false),
        Field::new("client_mutator", DataType::Utf8, false),
        Field::new("server_mutator", DataType::Utf8, false),
        Field::new("request_size", DataType::UInt64, false),
        Field::new("response_size", DataType::UInt64, false),
        Field::new("iterations", DataType::UInt64, false),
        Field::new("elapsed_ns", DataType::UInt64, false),
        Field::new("bytes_processed", DataType::UInt64, false),
        Field::new("rps", DataType::Float64, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(
                rows.iter().map(|r| r.benchmark.as_str()).collect::<Vec<_>>(),
            )) as ArrayRef,
            Arc::new(StringArray::from(
                rows.iter().map(|r| r.transport.as_str()).collect::<Vec<_>>(),
            )) as ArrayRef,
            Arc::new(StringArray::from(
                rows.iter()
                    .map(|r| r.client_mutator.as_str())
                    .collect::<Vec<_>>(),
            )) as ArrayRef,
            Arc::new(StringArray::from(
                rows.iter()
                    .map(|r| r.server_mutator.as_str())
                    .collect::<Vec<_>>(),
            )) as ArrayRef,
            Arc::new(UInt64Array::from(
                rows.iter().map(|r| r.request_size).collect::<Vec<_>>(),
            )) as ArrayRef,
            Arc::new(UInt64Array::from(
                rows.iter().map(|r| r.response_size).collect::<Vec<_>>(),
            )) as ArrayRef,
            Arc::new(UInt64Array::from(
                rows.iter().map(|r| r.iterations).collect::<Vec<_>>(),
            )) as ArrayRef,
            Arc::new(UInt64Array::from(
                rows.iter().map(|r| r.elapsed_ns).collect::<Vec<_>>(),
            )) as ArrayRef,
            Arc::new(UInt64Array::from(
                rows.iter().map(|r| r.bytes_processed).collect::<Vec<_>>(),
            )) as ArrayRef,
            Arc::new(Float64Array::from(
                rows.iter().map(|r| r.rps).collect::<Vec<_>>(),
            )) as ArrayRef,
        ],
    )?;

    let file = std::fs::File::create(path)?;
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(())
}
