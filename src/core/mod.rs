pub mod device;
pub mod hint_code;
pub mod order;
pub mod personal_number;
pub mod request;
pub mod ui_state;
pub mod util;
