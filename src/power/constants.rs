use std::time::Duration;

/**
 * How long presence has to be absent before the display is turned off.
 */
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(5 * 60);

/**
 * How long a single display power command may take.
 */
pub const POWER_ACTION_DEADLINE: Duration = Duration::from_secs(10);

/**
 * Command used to turn the display back on.
 * `tvservice -p` also works on some setups, but showed less compatibility.
 */
pub const DEFAULT_ON_COMMAND: &str = "xrandr --output HDMI-1 --mode 1920x1080 --rotate left";

/**
 * Command used to turn the display off.
 */
pub const DEFAULT_OFF_COMMAND: &str = "xrandr --output HDMI-1 --off";

/**
 * X display the power commands act on.
 */
pub const X_DISPLAY: &str = ":0";

/**
 * How many controller inputs may be queued.
 */
pub const INPUT_BUFFER: usize = 128;
