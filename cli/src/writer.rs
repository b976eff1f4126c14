use common::{models::TradeRecord, Result};
use std::fs::File;
use std::io;
use std::path::Path;

const TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S%.3f";
const HEADER: [&str; 10] = [
    "Time", "Service", "Currency", "Action", "Price", "Amount", "Fee", "Profit", "Total", "Remarks",
];

/// Report sink receiving trades one at a time, in order
pub trait TradeWriter {
    fn write(&mut self, trade: &TradeRecord) -> Result<()>;

    /// Flushes everything written so far
    fn close(self) -> Result<()>;
}

/// Writes one CSV row per trade with a running profit total
pub struct CsvTradeWriter<W: io::Write> {
    writer: csv::Writer<W>,
    total: f64,
}

impl CsvTradeWriter<File> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(File::create(path)?)
    }
}

impl<W: io::Write> CsvTradeWriter<W> {
    pub fn new(inner: W) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(inner);
        writer.write_record(HEADER).map_err(io::Error::from)?;
        Ok(Self { writer, total: 0.0 })
    }

    /// Running sum of the profit of every trade written
    pub fn total(&self) -> f64 {
        self.total
    }

    /// Flushes and hands back the underlying writer.
    pub fn finish(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| e.into_error().into())
    }
}

impl<W: io::Write> TradeWriter for CsvTradeWriter<W> {
    fn write(&mut self, trade: &TradeRecord) -> Result<()> {
        self.total += trade.profit;
        self.writer
            .write_record([
                trade.timestamp.format(TIME_FORMAT).to_string(),
                trade.service_name.clone(),
                trade.currency_pair.clone(),
                trade.action.to_string(),
                trade.price.to_string(),
                trade.amount.to_string(),
                trade.fee.to_string(),
                trade.profit.to_string(),
                self.total.to_string(),
                trade.remarks.join("\n"),
            ])
            .map_err(io::Error::from)?;
        Ok(())
    }

    fn close(self) -> Result<()> {
        self.finish().map(|_| ())
    }
}
