// Analysis over loaded sessions. Every function here is a pure computation on
// a borrowed `Session`; none of them touch the network or the cache.

pub mod compare;
pub mod pace;
pub mod regression;
pub mod strategy;
pub mod telemetry;
pub mod weather;

pub use compare::{
    DEFAULT_SEGMENT_THRESHOLD, LapComparison, LapDelta, Leader, SegmentDelta, TelemetryComparison,
    compare_laps, compare_sectors, compare_telemetry, split_segments,
};
pub use pace::{
    DEFAULT_QUICK_LAP_THRESHOLD, DEFAULT_ROLLING_WINDOW, FastestLap, PacePoint, RacePace,
    SectorAverages, SectorBests, SectorDelta, SectorRanks, fastest_lap, fastest_laps_per_driver,
    format_lap_time, quick_laps, race_pace, rolling_pace, sector_averages, sector_bests,
    sector_deltas, sector_ranks, top_fastest_laps,
};
pub use regression::LinearFit;
pub use strategy::{
    CompoundUsage, PitDelta, PitStop, Stint, StintPace, UndercutEffect, all_pit_stops, all_stints,
    compound_usage, pit_delta, pit_stops, segment_stints, stint_pace_table, undercut_effect,
};
pub use telemetry::{
    AlignedLap, AlignedLaps, Channel, DEFAULT_ALIGNMENT_POINTS, align_laps, brake_trace,
    fastest_lap_telemetry, speed_trace,
};
pub use weather::{WeatherSummary, summarize as summarize_weather};
