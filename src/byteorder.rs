pub trait WriteBytesLe {
    fn write_le(&self, dst: &mut Vec<u8>);
}

macro_rules! impl_num_le {
    ($($t:ty),+) => { $(
        impl WriteBytesLe for $t { #[inline] fn write_le(&self, dst: &mut Vec<u8>) { dst.extend_from_slice(&self.to_le_bytes()); }}
    )+ }
}

impl_num_le!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Sigproc strings: `i32` byte length, then the bytes without terminator.
impl WriteBytesLe for str {
    fn write_le(&self, dst: &mut Vec<u8>) {
        (self.len() as i32).write_le(dst);
        dst.extend_from_slice(self.as_bytes());
    }
}

impl WriteBytesLe for String {
    #[inline]
    fn write_le(&self, dst: &mut Vec<u8>) {
        self.as_str().write_le(dst);
    }
}

impl<T: WriteBytesLe> WriteBytesLe for [T] {
    #[inline]
    fn write_le(&self, dst: &mut Vec<u8>) {
        self.iter().for_each(|item| item.write_le(dst));
    }
}

#[macro_export]
macro_rules! join_bytes_le {
    ( $($value:expr),+ $(,)? ) => {{
        let mut vec = Vec::<u8>::new();
        $( $crate::byteorder::WriteBytesLe::write_le($value, &mut vec); )+
        vec
    }};
}
