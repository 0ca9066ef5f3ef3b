mod config;

use crate::config::Config;
use charlcd_gpio::delay::{Delay, StdDelay};
use charlcd_gpio::gpiod::GpiodPort;
use charlcd_gpio::lcd::hd44780::driver::{GpioHD44780Driver, HD44780Driver};
use charlcd_gpio::lcd::hd44780::{DataBus, Lcd, LcdWiring};
use charlcd_gpio::sim::SimulatedHd44780;
use charlcd_gpio::{GpioBias, GpioDriveMode, GpioPort, PinId};
use dotenv::dotenv;
use eyre::WrapErr;
use log::{debug, info};
use std::env::var;
use sysinfo::System;

fn parse_pin_bus(pin_str: &str) -> eyre::Result<DataBus> {
    let pins = pin_str
        .split([',', ' ', ';'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse())
        .collect::<Result<Vec<PinId>, _>>()?;
    Ok(DataBus::try_from(&pins[..])?)
}

fn pin_var(name: &str) -> eyre::Result<PinId> {
    let value = var(name).wrap_err_with(|| format!("{} is not set", name))?;
    value
        .parse()
        .wrap_err_with(|| format!("{} is not a valid pin", name))
}

/// R/W is optional; unset or `none` means it's tied to ground.
fn optional_pin_var(name: &str) -> eyre::Result<Option<PinId>> {
    match var(name) {
        Ok(value) if !value.trim().is_empty() && !value.trim().eq_ignore_ascii_case("none") => {
            Ok(Some(pin_var(name)?))
        }
        _ => Ok(None),
    }
}

fn wiring_from_env() -> eyre::Result<LcdWiring> {
    let data = var("CHARLCD_PINS_DATA").wrap_err("CHARLCD_PINS_DATA is not set")?;
    Ok(LcdWiring {
        rs: pin_var("CHARLCD_PIN_RS")?,
        rw: optional_pin_var("CHARLCD_PIN_RW")?,
        enable: pin_var("CHARLCD_PIN_E")?,
        data: parse_pin_bus(&data)?,
    })
}

/// Bias and drive mode for the data lines, `None` where the line default is kept.
///
/// Open drain plus external pull-ups lets the 3.3 V data lines drive a 5 V panel.
fn data_line_settings(
    bias: Option<String>,
    drive: Option<String>,
) -> eyre::Result<(Option<GpioBias>, Option<GpioDriveMode>)> {
    let bias = bias
        .map(|value| value.parse::<GpioBias>())
        .transpose()
        .wrap_err("CHARLCD_DATA_BIAS is not a valid bias")?;
    let drive = drive
        .map(|value| value.parse::<GpioDriveMode>())
        .transpose()
        .wrap_err("CHARLCD_DATA_DRIVE is not a valid drive mode")?;
    Ok((bias, drive))
}

fn load_config() -> eyre::Result<Config> {
    debug!("Trying to load config...");
    Ok(if let Some(config) = Config::try_load()? {
        info!("Config loaded.");
        config
    } else {
        info!("Config not found. Using default");
        let config = Config::default();
        config.save()?;
        info!("Default config saved.");
        config
    })
}

/// Initializes the display, writes one line of text per row and, if the R/W line is wired, reads
/// the rows back.
fn show<P: GpioPort, D: Delay>(
    port: P,
    delay: D,
    wiring: LcdWiring,
    config: &Config,
    lines: &[String],
) -> eyre::Result<Lcd<GpioHD44780Driver<P, D>>> {
    let driver = GpioHD44780Driver::new(port, delay, wiring);
    let mut lcd = Lcd::new(driver, config.lcd_config()?);

    lcd.init()?;
    lcd.set_cursor_visible(config.cursor)?;
    lcd.set_blink(config.blink)?;
    for glyph in &config.glyphs {
        lcd.create_char(glyph.slot, &glyph.rows)?;
    }
    debug!("{:?} initialized.", lcd);

    let rows = lcd.geometry().lines();
    for (row, line) in (0..rows).zip(lines) {
        lcd.set_cursor(0, row)?;
        lcd.print(line)?;
    }

    if lcd.driver().can_read() {
        for row in 0..rows {
            info!("Row {}: {:?}", row, lcd.read_line(row)?);
        }
    }

    Ok(lcd)
}

fn main() -> eyre::Result<()> {
    // Initialize environment and logger
    dotenv().ok();
    pretty_env_logger::init();

    const UNKNOWN_STR: &str = "???";

    info!(
        "charlcd {} on {} ({}), kernel {}",
        env!("CARGO_PKG_VERSION"),
        System::host_name().as_deref().unwrap_or(UNKNOWN_STR),
        System::cpu_arch(),
        System::kernel_version().as_deref().unwrap_or(UNKNOWN_STR),
    );

    let wiring = wiring_from_env()?;
    info!(
        "LCD @ RS: {}, RW: {}, E: {}, Data: {:?}",
        wiring.rs,
        wiring
            .rw
            .map_or_else(|| "GND".to_string(), |pin| pin.to_string()),
        wiring.enable,
        wiring.data.pins()
    );

    let config = load_config()?;

    let mut lines: Vec<String> = std::env::args().skip(1).collect();
    if lines.is_empty() {
        lines.push("Hello, world!".to_string());
    }

    let dry_run = var("CHARLCD_DRY_RUN").is_ok_and(|value| value.trim() == "1");
    if dry_run {
        info!("Dry run, using a simulated display");
        let sim = SimulatedHd44780::new(wiring);
        let lcd = show(sim.clone(), sim.delay(), wiring, &config, &lines)?;
        let columns = usize::from(lcd.geometry().columns());
        for &offset in lcd.row_offsets() {
            println!("|{}|", sim.text(offset, columns));
        }
        info!("Simulated init took {:?}", sim.now());
    } else {
        let chips = var("CHARLCD_GPIO_CHIPS").unwrap_or_else(|_| "/dev/gpiochip0".to_string());
        let chips: Vec<&str> = chips
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        debug!("Opening GPIO chips {:?}...", chips);
        let mut port = GpiodPort::open(&chips)?;
        let (bias, drive) =
            data_line_settings(var("CHARLCD_DATA_BIAS").ok(), var("CHARLCD_DATA_DRIVE").ok())?;
        debug!("Data lines bias: {:?}, drive: {:?}", bias, drive);
        for &pin in wiring.data.pins() {
            if let Some(bias) = bias {
                port.set_bias(pin, bias)?;
            }
            if let Some(drive) = drive {
                port.set_drive_mode(pin, drive)?;
            }
        }
        show(port, StdDelay, wiring, &config, &lines)?;
    }

    info!("Done.");
    Ok(())
}
