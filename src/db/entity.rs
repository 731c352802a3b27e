pub mod cab_trip;

pub use cab_trip::Entity as CabTrips;
pub use cab_trip::Model as CabTrip;
