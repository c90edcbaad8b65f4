// Tab contents. Each panel renders from a prepared `SessionView` and shows
// its own error in place when its analysis failed.

use egui::{Color32, RichText, Ui, Vec2b};
use egui_extras::{Column, TableBuilder};
use egui_plot::{Bar, BarChart, HLine, Legend, Line, Plot, PlotPoints, Points, VLine};
use itertools::Itertools;

use super::view::{Outcome, SessionView};
use super::{PALETTE_ORANGE, compound_colour, pair_colours, rgb, stroke_shade};
use crate::analysis::{Channel, Leader, format_lap_time};
use crate::session::Compound;

const PLOT_HEIGHT: f32 = 220.;
const ROW_HEIGHT: f32 = 18.;

fn panel_error(ui: &mut Ui, title: &str, message: &str) {
    ui.label(
        RichText::new(format!("{}: {}", title, message))
            .color(PALETTE_ORANGE)
            .italics(),
    );
}

fn show_outcome<T>(ui: &mut Ui, title: &str, outcome: &Outcome<T>, show: impl FnOnce(&mut Ui, &T)) {
    match outcome {
        Ok(value) => show(ui, value),
        Err(message) => panel_error(ui, title, message),
    }
}

fn seconds(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.3}", v))
        .unwrap_or_else(|| "--".to_string())
}

fn driver_colour(view: &SessionView, driver: &str) -> Color32 {
    view.session
        .driver(driver)
        .map(|d| rgb(d.rgb()))
        .unwrap_or(Color32::GRAY)
}

fn selected_colours(view: &SessionView) -> (Color32, Color32) {
    pair_colours(
        view.driver_a.as_deref().and_then(|d| view.session.driver(d)),
        view.driver_b.as_deref().and_then(|d| view.session.driver(d)),
    )
}

pub(crate) fn overview(ui: &mut Ui, view: &SessionView) {
    let session = &view.session;
    ui.heading(RichText::new(session.key.to_string()).color(Color32::WHITE));
    ui.label(format!(
        "{} drivers, {} laps",
        session.drivers.len(),
        session.total_laps()
    ));
    if let Some(fastest) = &view.fastest_lap {
        ui.label(
            RichText::new(format!(
                "Fastest lap: {} {} on lap {}",
                fastest.driver,
                format_lap_time(Some(fastest.lap_time_s)),
                fastest.lap_number
            ))
            .color(PALETTE_ORANGE)
            .strong(),
        );
    }
    ui.separator();

    match &view.weather {
        Some(weather) => {
            egui::Grid::new("weather_summary").striped(true).show(ui, |ui| {
                ui.label("Air temperature");
                ui.label(format!(
                    "{:.1} / {:.1} / {:.1} °C",
                    weather.air_temp_c.min, weather.air_temp_c.mean, weather.air_temp_c.max
                ));
                ui.end_row();
                ui.label("Track temperature");
                ui.label(format!(
                    "{:.1} / {:.1} / {:.1} °C",
                    weather.track_temp_c.min, weather.track_temp_c.mean, weather.track_temp_c.max
                ));
                ui.end_row();
                ui.label("Humidity");
                ui.label(format!("{:.0} %", weather.mean_humidity_pct));
                ui.end_row();
                ui.label("Wind");
                ui.label(format!("{:.1} m/s", weather.mean_wind_speed_mps));
                ui.end_row();
                ui.label("Rain");
                ui.label(if weather.rainfall { "yes" } else { "no" });
                ui.end_row();
            });

            let minutes = |f: fn(&crate::session::WeatherSample) -> f64| {
                session
                    .weather
                    .iter()
                    .map(|w| [w.time_s / 60., f(w)])
                    .collect_vec()
            };
            Plot::new("weather_plot")
                .height(PLOT_HEIGHT)
                .legend(Legend::default())
                .x_axis_label("Session time (min)")
                .show(ui, |plot_ui| {
                    plot_ui.line(
                        Line::new("Air °C", PlotPoints::new(minutes(|w| w.air_temp_c)))
                            .color(Color32::LIGHT_BLUE),
                    );
                    plot_ui.line(
                        Line::new("Track °C", PlotPoints::new(minutes(|w| w.track_temp_c)))
                            .color(PALETTE_ORANGE),
                    );
                    plot_ui.line(
                        Line::new("Humidity %", PlotPoints::new(minutes(|w| w.humidity_pct)))
                            .color(Color32::GRAY),
                    );
                });
        }
        None => panel_error(ui, "Weather", "not loaded for this session"),
    }
    ui.separator();

    TableBuilder::new(ui)
        .id_salt("entry_list")
        .striped(true)
        .vscroll(false)
        .column(Column::auto())
        .column(Column::auto())
        .column(Column::auto().at_least(160.))
        .column(Column::remainder())
        .header(ROW_HEIGHT, |mut header| {
            for title in ["#", "Driver", "Name", "Team"] {
                header.col(|ui| {
                    ui.strong(title);
                });
            }
        })
        .body(|mut body| {
            for driver in &session.drivers {
                body.row(ROW_HEIGHT, |mut row| {
                    row.col(|ui| {
                        ui.label(driver.number.to_string());
                    });
                    row.col(|ui| {
                        ui.label(RichText::new(&driver.abbreviation).color(rgb(driver.rgb())));
                    });
                    row.col(|ui| {
                        ui.label(&driver.full_name);
                    });
                    row.col(|ui| {
                        ui.label(&driver.team_name);
                    });
                });
            }
        });
}

pub(crate) fn pace(ui: &mut Ui, view: &SessionView) {
    ui.heading("Fastest laps");
    if view.fastest_laps.is_empty() {
        panel_error(ui, "Fastest laps", "no valid laps in this session");
    } else {
        let best = view.fastest_laps[0].lap_time_s;
        let bars = view
            .fastest_laps
            .iter()
            .enumerate()
            .map(|(i, lap)| {
                Bar::new(i as f64, lap.lap_time_s - best)
                    .name(&lap.driver)
                    .fill(driver_colour(view, &lap.driver))
            })
            .collect_vec();
        Plot::new("fastest_laps_plot")
            .height(PLOT_HEIGHT)
            .y_axis_label("Gap to fastest (s)")
            .allow_drag(false)
            .allow_zoom(false)
            .show(ui, |plot_ui| {
                plot_ui.bar_chart(BarChart::new("Gap", bars).width(0.7));
            });

        TableBuilder::new(ui)
            .id_salt("fastest_laps_table")
            .striped(true)
            .vscroll(false)
            .columns(Column::auto().at_least(70.), 4)
            .header(ROW_HEIGHT, |mut header| {
                for title in ["Pos", "Driver", "Lap", "Time"] {
                    header.col(|ui| {
                        ui.strong(title);
                    });
                }
            })
            .body(|mut body| {
                for (i, lap) in view.fastest_laps.iter().enumerate() {
                    body.row(ROW_HEIGHT, |mut row| {
                        row.col(|ui| {
                            ui.label((i + 1).to_string());
                        });
                        row.col(|ui| {
                            ui.label(&lap.driver);
                        });
                        row.col(|ui| {
                            ui.label(lap.lap_number.to_string());
                        });
                        row.col(|ui| {
                            ui.label(format_lap_time(Some(lap.lap_time_s)));
                        });
                    });
                }
            });
    }
    ui.separator();

    ui.heading("Rolling pace");
    let (colour_a, colour_b) = selected_colours(view);
    for (driver, outcome) in &view.rolling_pace {
        if let Err(message) = outcome {
            panel_error(ui, &format!("Rolling pace of {}", driver), message);
        }
    }
    Plot::new("rolling_pace_plot")
        .height(PLOT_HEIGHT)
        .legend(Legend::default())
        .x_axis_label("Lap")
        .y_axis_label("Lap time (s)")
        .show(ui, |plot_ui| {
            for (i, (driver, outcome)) in view.rolling_pace.iter().enumerate() {
                if let Ok(points) = outcome {
                    let series = points
                        .iter()
                        .map(|p| [p.lap_number as f64, p.average_s])
                        .collect_vec();
                    let colour = if i == 0 { colour_a } else { colour_b };
                    plot_ui.line(Line::new(driver.clone(), PlotPoints::new(series)).color(colour));
                }
            }
        });
    ui.separator();

    ui.heading("Sector bests");
    TableBuilder::new(ui)
        .id_salt("sector_bests_table")
        .striped(true)
        .vscroll(false)
        .columns(Column::auto().at_least(80.), 6)
        .header(ROW_HEIGHT, |mut header| {
            for title in ["Driver", "S1", "S2", "S3", "Theoretical", "Best lap"] {
                header.col(|ui| {
                    ui.strong(title);
                });
            }
        })
        .body(|mut body| {
            for bests in &view.sector_bests {
                body.row(ROW_HEIGHT, |mut row| {
                    row.col(|ui| {
                        ui.label(&bests.driver);
                    });
                    for sector in bests.sectors_s {
                        row.col(|ui| {
                            ui.label(seconds(sector));
                        });
                    }
                    row.col(|ui| {
                        ui.label(format_lap_time(bests.theoretical_best_s));
                    });
                    row.col(|ui| {
                        ui.label(format_lap_time(bests.best_lap_s));
                    });
                });
            }
        });
    ui.separator();

    ui.heading("Race pace");
    TableBuilder::new(ui)
        .id_salt("race_pace_table")
        .striped(true)
        .vscroll(false)
        .columns(Column::auto().at_least(80.), 5)
        .header(ROW_HEIGHT, |mut header| {
            for title in ["Driver", "Median", "Mean", "Std dev", "Laps"] {
                header.col(|ui| {
                    ui.strong(title);
                });
            }
        })
        .body(|mut body| {
            for pace in &view.race_pace {
                body.row(ROW_HEIGHT, |mut row| {
                    row.col(|ui| {
                        ui.label(&pace.driver);
                    });
                    row.col(|ui| {
                        ui.label(format_lap_time(Some(pace.median_s)));
                    });
                    row.col(|ui| {
                        ui.label(format_lap_time(Some(pace.mean_s)));
                    });
                    row.col(|ui| {
                        ui.label(format!("{:.3}", pace.std_dev_s));
                    });
                    row.col(|ui| {
                        ui.label(pace.lap_count.to_string());
                    });
                });
            }
        });
}

pub(crate) fn telemetry(ui: &mut Ui, view: &SessionView) {
    let (colour_a, colour_b) = selected_colours(view);

    show_outcome(ui, "Lap comparison", &view.lap_comparison, |ui, cmp| {
        let gap = cmp
            .laps
            .iter()
            .map(|l| [l.lap_number as f64, l.gap_s])
            .collect_vec();
        Plot::new("gap_plot")
            .height(PLOT_HEIGHT * 0.6)
            .legend(Legend::default())
            .x_axis_label("Lap")
            .y_axis_label(format!("Gap {} to {} (s)", cmp.driver_a, cmp.driver_b))
            .show(ui, |plot_ui| {
                plot_ui.hline(HLine::new("", 0.).color(Color32::DARK_GRAY));
                plot_ui.line(Line::new("Gap", PlotPoints::new(gap)).color(colour_a));
            });
    });
    ui.separator();

    show_outcome(ui, "Telemetry", &view.telemetry, |ui, cmp| {
        let aligned = &cmp.aligned;
        let link = ui.id().with("telemetry_link");
        let overlay = |ui: &mut Ui, id: &str, channels: &[Channel]| {
            Plot::new(id)
                .height(PLOT_HEIGHT)
                .legend(Legend::default())
                .link_axis(link, Vec2b::new(true, false))
                .link_cursor(link, Vec2b::new(true, false))
                .show(ui, |plot_ui| {
                    for channel in channels {
                        for (lap, driver, colour) in
                            [(0, &cmp.driver_a, colour_a), (1, &cmp.driver_b, colour_b)]
                        {
                            let colour = if *channel == Channel::Brake {
                                stroke_shade(colour, Color32::RED, 0.5)
                            } else {
                                colour
                            };
                            plot_ui.line(
                                Line::new(
                                    format!("{} {}", driver, channel.label()),
                                    PlotPoints::new(aligned.series(lap, *channel)),
                                )
                                .color(colour),
                            );
                        }
                    }
                });
        };

        ui.label(RichText::new("Speed").strong());
        overlay(ui, "speed_plot", &[Channel::Speed]);
        ui.label(RichText::new("Throttle and brake").strong());
        overlay(ui, "pedals_plot", &[Channel::Throttle, Channel::Brake]);
        ui.label(RichText::new("Gear").strong());
        overlay(ui, "gear_plot", &[Channel::Gear]);

        ui.label(
            RichText::new(format!("Time delta {} to {}", cmp.driver_a, cmp.driver_b)).strong(),
        );
        let delta = aligned
            .distance_m
            .iter()
            .zip(&cmp.time_delta)
            .map(|(d, t)| [*d, *t])
            .collect_vec();
        Plot::new("time_delta_plot")
            .height(PLOT_HEIGHT * 0.6)
            .link_axis(link, Vec2b::new(true, false))
            .x_axis_label("Distance (m)")
            .show(ui, |plot_ui| {
                plot_ui.hline(HLine::new("", 0.).color(Color32::DARK_GRAY));
                plot_ui.line(Line::new("Delta", PlotPoints::new(delta)).color(PALETTE_ORANGE));
            });

        ui.separator();
        ui.label(RichText::new("Circuit map").strong());
        let positions = aligned.laps[0].positions();
        if positions.len() < aligned.distance_m.len() {
            panel_error(ui, "Circuit map", "position data was not loaded");
            return;
        }
        Plot::new("circuit_map")
            .height(PLOT_HEIGHT * 2.)
            .data_aspect(1.)
            .show_axes(false)
            .show_grid(false)
            .legend(Legend::default())
            .show(ui, |plot_ui| {
                for segment in &view.segments {
                    let (name, colour) = match segment.leader {
                        Leader::DriverA => (format!("{} faster", cmp.driver_a), colour_a),
                        Leader::DriverB => (format!("{} faster", cmp.driver_b), colour_b),
                        Leader::Even => ("Even".to_string(), Color32::LIGHT_GRAY),
                    };
                    // one point of overlap keeps the drawn track continuous
                    let end = (segment.end_index + 2).min(positions.len());
                    let points = positions[segment.start_index..end]
                        .iter()
                        .map(|(x, y)| [*x, *y])
                        .collect_vec();
                    plot_ui.line(Line::new(name, PlotPoints::new(points)).color(colour).width(4.));
                }
            });
    });
}

pub(crate) fn strategy(ui: &mut Ui, view: &SessionView) {
    ui.heading("Stints");
    let drivers = view
        .stints
        .iter()
        .map(|s| s.driver.as_str())
        .unique()
        .collect_vec();
    let charts = Compound::ALL
        .iter()
        .filter_map(|compound| {
            let bars = view
                .stints
                .iter()
                .filter(|s| s.compound == *compound)
                .filter_map(|s| {
                    let row = drivers.iter().position(|d| *d == s.driver)?;
                    Some(
                        Bar::new(row as f64, s.lap_count as f64)
                            .base_offset(s.start_lap as f64 - 1.)
                            .name(format!("{} stint {}", s.driver, s.index))
                            .fill(compound_colour(*compound)),
                    )
                })
                .collect_vec();
            (!bars.is_empty()).then(|| {
                BarChart::new(compound.to_string(), bars)
                    .horizontal()
                    .width(0.7)
                    .color(compound_colour(*compound))
            })
        })
        .collect_vec();
    let driver_labels = drivers.iter().map(|d| d.to_string()).collect_vec();
    Plot::new("stints_plot")
        .height((drivers.len() as f32 * 22.).max(PLOT_HEIGHT))
        .legend(Legend::default())
        .x_axis_label("Lap")
        .y_axis_formatter(move |mark, _range| {
            let row = mark.value.round();
            if (mark.value - row).abs() < 1e-6 && row >= 0. {
                driver_labels.get(row as usize).cloned().unwrap_or_default()
            } else {
                String::new()
            }
        })
        .allow_drag(Vec2b::new(true, false))
        .show(ui, |plot_ui| {
            for chart in charts {
                plot_ui.bar_chart(chart);
            }
        });
    ui.separator();

    ui.heading("Pit stops");
    TableBuilder::new(ui)
        .id_salt("pit_stops_table")
        .striped(true)
        .vscroll(false)
        .columns(Column::auto().at_least(80.), 6)
        .header(ROW_HEIGHT, |mut header| {
            for title in ["Driver", "Lap", "From", "To", "Pit lane", "Delta"] {
                header.col(|ui| {
                    ui.strong(title);
                });
            }
        })
        .body(|mut body| {
            for stop in &view.pit_stops {
                body.row(ROW_HEIGHT, |mut row| {
                    row.col(|ui| {
                        ui.label(&stop.driver);
                    });
                    row.col(|ui| {
                        ui.label(stop.in_lap.to_string());
                    });
                    row.col(|ui| {
                        ui.label(
                            RichText::new(stop.compound_before.to_string())
                                .color(compound_colour(stop.compound_before)),
                        );
                    });
                    row.col(|ui| {
                        ui.label(
                            RichText::new(stop.compound_after.to_string())
                                .color(compound_colour(stop.compound_after)),
                        );
                    });
                    row.col(|ui| {
                        ui.label(seconds(stop.pit_duration_s));
                    });
                    row.col(|ui| {
                        ui.label(seconds(stop.delta_s));
                    });
                });
            }
        });
    ui.separator();

    let driver = view.driver_a.clone().unwrap_or_default();
    ui.heading(format!("Degradation of {}", driver));
    let (colour_a, _) = selected_colours(view);
    Plot::new("degradation_plot")
        .height(PLOT_HEIGHT)
        .legend(Legend::default())
        .x_axis_label("Lap in stint")
        .y_axis_label("Lap time (s)")
        .show(ui, |plot_ui| {
            for stint in view.stints.iter().filter(|s| s.driver == driver) {
                let Some(fit) = stint.degradation else {
                    continue;
                };
                let fitted = (0..stint.lap_count)
                    .map(|i| [i as f64, fit.predict(i as f64)])
                    .collect_vec();
                plot_ui.line(
                    Line::new(
                        format!(
                            "Stint {} {} ({:+.3} s/lap)",
                            stint.index, stint.compound, fit.slope
                        ),
                        PlotPoints::new(fitted),
                    )
                    .color(compound_colour(stint.compound)),
                );
            }
        });

    show_outcome(ui, "Lap time trend", &view.trend, |ui, trend| {
        ui.label(format!(
            "Trend {:+.3} s/lap over {} laps (r² {:.2})",
            trend.fit.slope, trend.fit.samples, trend.fit.r_squared
        ));
    });

    ui.heading("Pit window");
    show_outcome(ui, "Pit window", &view.pit_window, |ui, window| {
        match window.pit_lap {
            Some(lap) => ui.label(
                RichText::new(format!("Projected stop around lap {}", lap))
                    .color(PALETTE_ORANGE)
                    .strong(),
            ),
            None => ui.label("Lap times stay within the threshold for the whole race"),
        };
        let actual = window
            .trend
            .points
            .iter()
            .map(|p| [p.lap_number as f64, p.actual_s])
            .collect_vec();
        let predicted = window
            .trend
            .points
            .iter()
            .map(|p| [p.lap_number as f64, p.predicted_s])
            .collect_vec();
        Plot::new("pit_window_plot")
            .height(PLOT_HEIGHT)
            .legend(Legend::default())
            .x_axis_label("Lap")
            .show(ui, |plot_ui| {
                plot_ui.points(
                    Points::new("Actual", PlotPoints::new(actual))
                        .color(colour_a)
                        .radius(3.),
                );
                plot_ui.line(
                    Line::new("Fitted", PlotPoints::new(predicted)).color(Color32::LIGHT_GRAY),
                );
                plot_ui.hline(HLine::new("Threshold", window.threshold_s).color(PALETTE_ORANGE));
                if let Some(lap) = window.pit_lap {
                    plot_ui.vline(VLine::new("Pit lap", lap as f64).color(Color32::RED));
                }
            });
    });
}
