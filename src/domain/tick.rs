//! Exchange tick-size bands and price normalization.
//!
//! Prices are snapped in integer hundredths so a normalized price is an exact
//! multiple of its increment rather than an accumulation of float error.

/// One price band: prices below `upper` (in hundredths) trade in steps of
/// `tick` hundredths. `upper == None` marks the open-ended top band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickBand {
    pub upper: Option<i64>,
    pub tick: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickTable {
    bands: Vec<TickBand>,
}

fn to_hundredths(price: f64) -> i64 {
    (price * 100.0).round() as i64
}

impl TickTable {
    /// Bands must be sorted by `upper` and end with an open band.
    pub fn new(bands: Vec<TickBand>) -> Option<Self> {
        let last_open = bands.last().is_some_and(|b| b.upper.is_none());
        let sorted = bands.windows(2).all(|w| match (w[0].upper, w[1].upper) {
            (Some(a), Some(b)) => a < b,
            (Some(_), None) => true,
            (None, _) => false,
        });
        let positive = bands.iter().all(|b| b.tick > 0);
        (last_open && sorted && positive).then_some(Self { bands })
    }

    /// Taiwan Stock Exchange equity schedule.
    pub fn twse() -> Self {
        Self {
            bands: vec![
                TickBand { upper: Some(1_000), tick: 1 },
                TickBand { upper: Some(5_000), tick: 5 },
                TickBand { upper: Some(10_000), tick: 10 },
                TickBand { upper: Some(50_000), tick: 50 },
                TickBand { upper: Some(100_000), tick: 100 },
                TickBand { upper: None, tick: 500 },
            ],
        }
    }

    /// A single fixed increment for every price.
    pub fn uniform(tick: f64) -> Self {
        Self {
            bands: vec![TickBand {
                upper: None,
                tick: to_hundredths(tick).max(1),
            }],
        }
    }

    fn tick_hundredths(&self, hundredths: f64) -> i64 {
        self.bands
            .iter()
            .find(|b| b.upper.is_none_or(|u| hundredths < u as f64))
            .map(|b| b.tick)
            .unwrap_or(1)
    }

    /// Increment of the band `price` falls in, taken from the unrounded price.
    pub fn tick_size(&self, price: f64) -> f64 {
        self.tick_hundredths(price * 100.0) as f64 / 100.0
    }

    /// Round to the nearest valid increment.
    ///
    /// The band is taken from the raw price and then re-checked against the
    /// rounded price; if the rounded price falls in another band it is
    /// rounded again with that band's increment.
    pub fn normalize(&self, price: f64) -> f64 {
        if !price.is_finite() || price <= 0.0 {
            return price;
        }
        let raw = price * 100.0;
        let mut tick = self.tick_hundredths(raw.round());
        let mut snapped = (raw / tick as f64).round() as i64 * tick;
        for _ in 0..self.bands.len() {
            let band_tick = self.tick_hundredths(snapped as f64);
            if band_tick == tick {
                break;
            }
            tick = band_tick;
            snapped = (raw / tick as f64).round() as i64 * tick;
        }
        snapped.max(tick) as f64 / 100.0
    }
}

impl Default for TickTable {
    fn default() -> Self {
        Self::twse()
    }
}

/// Increment for `price` under the TWSE schedule.
pub fn tick_size(price: f64) -> f64 {
    TickTable::twse().tick_size(price)
}

/// `price` snapped to the TWSE schedule.
pub fn normalize_price(price: f64) -> f64 {
    TickTable::twse().normalize(price)
}
