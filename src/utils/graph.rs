use num::Num;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Point<T: Num> {
    pub x: T,
    pub y: T,
}

impl<T: Num> Point<T> {
    pub fn new(x: T, y: T) -> Self {
        Point { x, y }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Box<T: Num> {
    pub x: T,
    pub y: T,
    pub width: T,
    pub height: T,
}

impl<T: Num> Box<T> {
    pub fn new(x: T, y: T, width: T, height: T) -> Self {
        Box {
            x,
            y,
            width,
            height,
        }
    }
}
