pub mod car;
pub mod catalog;
pub mod reservation;
pub mod user;

pub use car::{Car, CarStatus, CarSummary};
pub use catalog::{CarMake, Location, SeatCount};
pub use reservation::{Reservation, ReservationStatus};
pub use user::User;
