pub mod contour_effect;
pub mod effect_factory;
pub mod red_nose_effect;
