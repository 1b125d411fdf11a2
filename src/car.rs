use crate::track::BoundaryMap;
use nalgebra::{Point2, Vector2};

// --- Sensor / Control Layout ---

pub const NUM_RADARS: usize = 5;
pub const NUM_DECISIONS: usize = 4;

// Radar headings relative to the car, in channel order. Controllers are trained
// against this order, so it must never change.
pub const RADAR_ANGLES: [f64; NUM_RADARS] = [-90.0, -45.0, 0.0, 45.0, 90.0];

// Bounding box corners: front-left, front-right, rear-left, rear-right.
const CORNER_ANGLES: [f64; 4] = [30.0, 150.0, 210.0, 330.0];

pub type SensorVector = [u32; NUM_RADARS];
pub type ControlOutputs = [f64; NUM_DECISIONS];

/// One discrete control choice per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    TurnLeft,
    TurnRight,
    Decelerate,
    Accelerate,
}

impl Decision {
    pub const ALL: [Decision; NUM_DECISIONS] = [
        Decision::TurnLeft,
        Decision::TurnRight,
        Decision::Decelerate,
        Decision::Accelerate,
    ];

    /// Index of the largest output wins; on ties the lowest index wins.
    pub fn from_outputs(outputs: &ControlOutputs) -> Self {
        let mut best = 0;
        for i in 1..NUM_DECISIONS {
            if outputs[i] > outputs[best] {
                best = i;
            }
        }
        Self::ALL[best]
    }
}

/// Unit vector for a heading in degrees. The `360 - angle` form puts the
/// simulation in screen space (y grows downwards), which radar and collision share.
pub fn heading_vector(angle_degrees: f64) -> Vector2<f64> {
    let radians = (360.0 - angle_degrees).to_radians();
    Vector2::new(radians.cos(), radians.sin())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarParams {
    pub size: f64,
    pub initial_speed: f64,
    pub min_speed: f64,
    pub turn_step: f64,
    pub radar_max_length: u32,
    pub radar_bucket: u32,
}

impl Default for CarParams {
    fn default() -> Self {
        Self {
            size: 10.0,
            initial_speed: 5.0,
            min_speed: 5.0,
            turn_step: 20.0,
            radar_max_length: 300,
            radar_bucket: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadarReading {
    pub hit: Point2<f64>,
    pub distance: f64,
}

#[derive(Debug, Clone)]
pub struct Car {
    pub position: Point2<f64>, // Top-left of the footprint
    pub angle: f64,
    pub speed: f64,
    speed_set: bool, // Initial speed is latched on the first update
    pub center: Point2<f64>,
    pub corners: [Point2<f64>; 4],
    pub radars: [RadarReading; NUM_RADARS],
    pub alive: bool,
    pub distance: f64,
    pub time: u32,
    params: CarParams,
}

impl Car {
    pub fn new(start: (i32, i32), heading: f64, params: CarParams) -> Self {
        let position = Point2::new(start.0 as f64, start.1 as f64);
        let mut car = Self {
            position,
            angle: heading,
            speed: 0.0,
            speed_set: false,
            center: position,
            corners: [position; 4],
            radars: [RadarReading { hit: position, distance: 0.0 }; NUM_RADARS],
            alive: true,
            distance: 0.0,
            time: 0,
            params,
        };
        car.recompute_geometry();
        car.radars = [RadarReading { hit: car.center, distance: 0.0 }; NUM_RADARS];
        car
    }

    pub fn apply_decision(&mut self, decision: Decision) {
        match decision {
            Decision::TurnLeft => self.angle += self.params.turn_step,
            Decision::TurnRight => self.angle -= self.params.turn_step,
            Decision::Decelerate => {
                // Requests below the floor are dropped, not clamped
                if self.speed - 1.0 >= self.params.min_speed {
                    self.speed -= 1.0;
                }
            }
            Decision::Accelerate => self.speed += 1.0,
        }
    }

    /// Moves the car one tick along its heading and refreshes center and corners.
    pub fn advance(&mut self) {
        if !self.speed_set {
            self.speed = self.params.initial_speed;
            self.speed_set = true;
        }

        self.position += heading_vector(self.angle) * self.speed;
        self.distance += self.speed;
        self.time += 1;

        self.recompute_geometry();
    }

    fn recompute_geometry(&mut self) {
        let half = self.params.size / 2.0;
        // Center snaps to the integer pixel the footprint starts on
        self.center = Point2::new(self.position.x.trunc() + half, self.position.y.trunc() + half);
        for (corner, offset) in self.corners.iter_mut().zip(CORNER_ANGLES) {
            *corner = self.center + heading_vector(self.angle + offset) * half;
        }
    }

    /// Kills the car if any corner sits on a wall or outside the map. Never revives.
    pub fn check_collision(&mut self, map: &BoundaryMap) -> bool {
        if self.corners.iter().any(|c| map.is_blocked(c.x as i64, c.y as i64)) {
            self.alive = false;
        }
        self.alive
    }

    /// Marches a ray from the center one pixel at a time until it leaves the track
    /// or reaches `radar_max_length`.
    pub fn scan_radar(&self, map: &BoundaryMap, relative_angle: f64) -> RadarReading {
        let direction = heading_vector(self.angle + relative_angle);
        let mut length = 0;
        loop {
            let sample = self.center + direction * length as f64;
            if length >= self.params.radar_max_length || map.is_blocked(sample.x as i64, sample.y as i64) {
                // The marched length is the Euclidean distance to the sample point
                return RadarReading { hit: sample, distance: length as f64 };
            }
            length += 1;
        }
    }

    pub fn refresh_radars(&mut self, map: &BoundaryMap) {
        for (slot, relative) in RADAR_ANGLES.iter().enumerate() {
            self.radars[slot] = self.scan_radar(map, *relative);
        }
    }

    /// Radar distances quantized into buckets, in scan order.
    pub fn sensor_vector(&self) -> SensorVector {
        let bucket = self.params.radar_bucket as f64;
        let mut values = [0; NUM_RADARS];
        for (value, radar) in values.iter_mut().zip(&self.radars) {
            *value = (radar.distance / bucket).floor() as u32;
        }
        values
    }

    pub fn reward(&self) -> f64 {
        self.distance / (self.params.size / 2.0)
    }

    /// Full per-tick update for a live car: move, collide, then re-sense.
    pub fn update(&mut self, map: &BoundaryMap) {
        self.advance();
        if self.check_collision(map) {
            self.refresh_radars(map);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_map(size: u32) -> BoundaryMap {
        BoundaryMap::from_fn(size, size, |_, _| false)
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
    }

    #[test]
    fn decision_picks_first_maximum() {
        assert_eq!(Decision::from_outputs(&[0.1, 0.9, 0.3, 0.2]), Decision::TurnRight);
        assert_eq!(Decision::from_outputs(&[0.5, 0.5, 0.5, 0.5]), Decision::TurnLeft);
        assert_eq!(Decision::from_outputs(&[-1.0, 0.0, 2.0, 2.0]), Decision::Decelerate);
        assert_eq!(Decision::from_outputs(&[-1.0, -1.0, -1.0, 0.0]), Decision::Accelerate);
    }

    #[test]
    fn speed_latches_once_then_respects_floor() {
        let mut car = Car::new((100, 100), 0.0, CarParams::default());
        car.apply_decision(Decision::Accelerate);
        car.advance();
        assert_eq!(car.speed, 5.0);

        car.apply_decision(Decision::Decelerate);
        assert_eq!(car.speed, 5.0);

        car.apply_decision(Decision::Accelerate);
        car.apply_decision(Decision::Accelerate);
        car.advance();
        assert_eq!(car.speed, 7.0); // No second latch

        car.apply_decision(Decision::Decelerate);
        car.apply_decision(Decision::Decelerate);
        car.apply_decision(Decision::Decelerate);
        assert_eq!(car.speed, 5.0);
    }

    #[test]
    fn turning_adjusts_angle_by_step() {
        let mut car = Car::new((0, 0), 90.0, CarParams::default());
        car.apply_decision(Decision::TurnLeft);
        assert_eq!(car.angle, 110.0);
        car.apply_decision(Decision::TurnRight);
        car.apply_decision(Decision::TurnRight);
        assert_eq!(car.angle, 70.0);
    }

    #[test]
    fn advance_moves_in_screen_space() {
        // Heading 90 points up the screen, i.e. towards smaller y
        let mut car = Car::new((100, 100), 90.0, CarParams::default());
        car.advance();
        assert_close(car.position.x, 100.0);
        assert_close(car.position.y, 95.0);
        assert_eq!(car.distance, 5.0);
        assert_eq!(car.time, 1);

        let mut east = Car::new((100, 100), 0.0, CarParams::default());
        east.advance();
        assert_close(east.position.x, 105.0);
        assert_eq!(east.center.x, 110.0);
    }

    #[test]
    fn corners_sit_on_circle_around_center() {
        let mut car = Car::new((50, 50), 0.0, CarParams::default());
        car.advance();
        for corner in &car.corners {
            assert_close((corner - car.center).norm(), 5.0);
        }
        // Heading east: the 30 and 330 degree corners lead, 150 and 210 trail
        assert!(car.corners[0].x > car.center.x);
        assert!(car.corners[3].x > car.center.x);
        assert!(car.corners[1].x < car.center.x);
        assert!(car.corners[2].x < car.center.x);
        // +30 is above the center on screen, +330 below
        assert!(car.corners[0].y < car.center.y);
        assert!(car.corners[3].y > car.center.y);
    }

    #[test]
    fn radar_caps_at_max_length_on_open_map() {
        let map = open_map(800);
        let mut car = Car::new((395, 395), 37.0, CarParams::default());
        car.refresh_radars(&map);
        for radar in &car.radars {
            assert_eq!(radar.distance, 300.0);
        }
        assert_eq!(car.sensor_vector(), [10; NUM_RADARS]);
    }

    #[test]
    fn radar_stops_at_wall() {
        // Wall from x = 160 onwards
        let map = BoundaryMap::from_fn(400, 400, |x, _| x >= 160);
        let mut car = Car::new((95, 195), 0.0, CarParams::default());
        car.refresh_radars(&map);
        let ahead = car.radars[2];
        assert_eq!(car.center, Point2::new(100.0, 200.0));
        assert_eq!(ahead.distance, 60.0);
        assert_eq!(ahead.hit.x as i64, 160);
        assert_eq!(car.sensor_vector()[2], 2);
        // Side rays run into the map edges instead; y = 0 is still on the map
        assert_eq!(car.radars[0].distance, 200.0);
        assert_eq!(car.radars[4].distance, 201.0);
    }

    #[test]
    fn radar_treats_map_edge_as_wall() {
        let map = open_map(120);
        let car = Car::new((55, 55), 0.0, CarParams::default());
        let reading = car.scan_radar(&map, 0.0);
        assert_eq!(reading.distance, 60.0);
    }

    #[test]
    fn collision_kills_and_never_revives() {
        let map = BoundaryMap::from_fn(300, 300, |x, _| x >= 110);
        let mut car = Car::new((100, 100), 0.0, CarParams::default());
        car.update(&map);
        assert!(!car.alive);

        // Moving back onto open track does not resurrect the car
        car.position = Point2::new(10.0, 10.0);
        car.angle = 180.0;
        car.advance();
        assert!(!car.check_collision(&map));
    }

    #[test]
    fn driving_off_the_map_is_a_crash() {
        // All track, no walls: only the map edge can stop these cars
        let map = open_map(120);

        let mut east = Car::new((108, 50), 0.0, CarParams::default());
        east.update(&map);
        assert!(east.corners.iter().any(|c| c.x >= 120.0));
        assert!(!east.alive);

        // Negative coordinates past the left and top edges
        let mut west = Car::new((2, 50), 180.0, CarParams::default());
        west.update(&map);
        assert!(west.corners.iter().any(|c| c.x < 0.0));
        assert!(!west.alive);

        let mut north = Car::new((50, 2), 90.0, CarParams::default());
        north.update(&map);
        assert!(north.corners.iter().any(|c| c.y < 0.0));
        assert!(!north.alive);

        // Same move with room to spare survives
        let mut inside = Car::new((50, 50), 0.0, CarParams::default());
        inside.update(&map);
        assert!(inside.alive);
    }

    #[test]
    fn reward_scales_with_distance() {
        let map = open_map(400);
        let mut car = Car::new((200, 200), 0.0, CarParams::default());
        car.update(&map);
        car.update(&map);
        assert_eq!(car.distance, 10.0);
        assert_eq!(car.reward(), 2.0);
    }

    #[test]
    fn sensor_vector_is_stable_between_ticks() {
        let map = BoundaryMap::from_fn(500, 500, |x, y| x > 420 || y < 30);
        let mut car = Car::new((240, 240), 60.0, CarParams::default());
        car.update(&map);
        assert_eq!(car.sensor_vector(), car.sensor_vector());
        let before = car.radars;
        car.refresh_radars(&map);
        assert_eq!(before, car.radars);
    }
}
