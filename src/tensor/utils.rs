/// Walks the buffer addresses of a strided view in row-major logical order.
pub struct OffsetIterator {
    index: Vec<usize>,
    shape: Vec<usize>,
    strides: Vec<isize>,
    current: isize,
    remaining: usize,
}

impl OffsetIterator {
    pub fn new(shape: &[usize], strides: &[isize], offset: usize) -> OffsetIterator {
        OffsetIterator {
            index: vec![0; shape.len()],
            shape: shape.to_vec(),
            strides: strides.to_vec(),
            current: offset as isize,
            remaining: shape.iter().product(),
        }
    }
}

impl Iterator for OffsetIterator {
    type Item = usize;
    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let address = self.current as usize;
        self.remaining -= 1;
        if self.remaining > 0 {
            for axis in (0..self.index.len()).rev() {
                self.index[axis] += 1;
                self.current += self.strides[axis];
                if self.index[axis] < self.shape[axis] {
                    break;
                }
                self.current -= self.strides[axis] * self.shape[axis] as isize;
                self.index[axis] = 0;
            }
        }
        Some(address)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for OffsetIterator {}

#[test]
fn test_offset_iterator_transposed() {
    // a 2x3 row-major buffer read as its 3x2 transpose
    let addresses: Vec<_> = OffsetIterator::new(&[3, 2], &[1, 3], 0).collect();
    assert_eq!(addresses, vec![0, 3, 1, 4, 2, 5]);
}

#[test]
fn test_offset_iterator_scalar_and_empty() {
    assert_eq!(OffsetIterator::new(&[], &[], 4).collect::<Vec<_>>(), vec![4]);
    assert_eq!(OffsetIterator::new(&[2, 0], &[0, 1], 0).count(), 0);
}
