/**
 * Line prefix of presence readings, e.g. `Person: AWAY`.
 */
pub const PREFIX_PERSON: &str = "Person: ";

/**
 * Line prefix of gesture readings, e.g. `Gesture: LEFT`.
 */
pub const PREFIX_GESTURE: &str = "Gesture: ";

/**
 * Line prefix of diagnostics reported by the firmware itself.
 */
pub const PREFIX_ERROR: &str = "ERROR: ";

/**
 * Baud rate of the microcontroller sketch.
 */
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/**
 * Device nodes considered when no explicit path is configured.
 */
pub const DEFAULT_PATH_PREFIXES: [&str; 1] = ["/dev/ttyUSB"];

/**
 * How many consecutive failed sessions are tolerated before giving up.
 */
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/**
 * How long (milliseconds) a single blocking read on the serial port may wait for data.
 * A timeout is not an error, it only gives the reader a chance to notice that the session ended.
 */
pub const READ_TIMEOUT: u64 = 500;

/**
 * How many raw lines may be buffered between the serial reader and the session.
 */
pub const LINE_BUFFER: usize = 64;
