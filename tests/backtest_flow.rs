use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;

use candle_forecaster::config::{ForecastConfig, ModelSettings};
use candle_forecaster::engine::{simulate_balance, BalanceSignal, ForecastPipeline};
use candle_forecaster::types::{Candle, TimeFrame};

fn wave(n: usize) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let step = [0i64, 3, 1, 4, 2][i % 5];
            let open = Decimal::from(200 + i as i64 + step);
            let close = if i % 3 == 0 { open - Decimal::from(2) } else { open + Decimal::from(3) };
            Candle {
                symbol: "ETHUSDT".to_string(),
                timeframe: TimeFrame::M15,
                open_time: start + Duration::minutes(15 * i as i64),
                open,
                high: open.max(close) + Decimal::ONE,
                low: open.min(close) - Decimal::ONE,
                close,
                volume: Decimal::from(50 + i as i64),
            }
        })
        .collect()
}

fn config() -> ForecastConfig {
    ForecastConfig {
        model: ModelSettings {
            hidden_layers: vec![16, 8],
            epochs: 10,
            batch_size: 8,
            seed: Some(2024),
            ..ModelSettings::default()
        },
        ..ForecastConfig::default()
    }
}

#[tokio::test]
async fn forecast_filter_backtest_flow() {
    let candles = wave(24);
    let report = ForecastPipeline::new(&config()).run(candles.clone()).await.unwrap();

    assert_eq!(report.symbol, "ETHUSDT");
    assert_eq!(report.records.len(), candles.len());
    assert!(report.records[0].operation.is_none());
    assert!(report.records[1].operation.is_none());
    assert!(report.records[23].operation.is_none());
    assert!(report.filtered.len() <= report.records.len());
    assert!(report.filtered.iter().all(|r| report.records.contains(r)));

    let ledger = &report.backtest;
    let model: Decimal = ledger.trades.iter().map(|t| t.model_profit).sum();
    let market: Decimal = ledger.trades.iter().map(|t| t.market_profit).sum();
    assert_eq!(ledger.totals.model_profit, model);
    assert_eq!(ledger.totals.market_profit, market);
    for pair in ledger.trades.windows(2) {
        assert!(pair[0].close_date <= pair[1].open_date);
    }
}

#[tokio::test]
async fn seeded_runs_are_reproducible() {
    let pipeline = ForecastPipeline::new(&config());
    let first = pipeline.run(wave(12)).await.unwrap();
    let second = pipeline.run(wave(12)).await.unwrap();
    assert_eq!(first.records, second.records);
}

#[tokio::test]
async fn balance_replay_of_a_forecast_series() {
    let report = ForecastPipeline::new(&config()).run(wave(16)).await.unwrap();
    let signals = BalanceSignal::from_records(&report.records);
    let balance = simulate_balance(Decimal::from(1000), &signals);

    assert_eq!(balance.initial_balance, Decimal::from(1000));
    assert!(balance.final_balance >= Decimal::ZERO);
    assert!(balance.conversions <= signals.len());
}
