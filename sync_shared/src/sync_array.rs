//! Synchronized arrays.
//!
//! A `SyncArray<T>` mirrors a server-owned ordered sequence (a skill
//! list, a buff bar). The server ships structural changes as a stream of
//! tagged operations so only touched elements cross the wire; applying
//! them in wire order reproduces the server's sequence exactly.

use crate::serial::{read_seq, write_seq, NetReader, NetState, NetWriter, SerialError};

const OP_UPDATE: u8 = 0;
const OP_PUSH_BACK: u8 = 1;
const OP_POP_BACK: u8 = 2;
const OP_INSERT: u8 = 3;
const OP_ERASE: u8 = 4;
const OP_CLEAR: u8 = 5;
const OP_RESIZE: u8 = 6;
const OP_REPLACE: u8 = 7;

/// One structural operation, write side. The read side consumes the
/// tagged wire form directly in [`SyncArray::read_delta`].
#[derive(Debug, Clone)]
pub enum SyncOp<T> {
    /// Apply a field delta to the element at `index`.
    Update { index: u16, dirty: u32, element: T },
    PushBack(T),
    PopBack,
    Insert { index: u16, element: T },
    Erase { index: u16 },
    Clear,
    Resize { len: u16 },
    /// Atomically replace the whole sequence.
    Replace(Vec<T>),
}

/// Encodes a delta frame: `u32 byte_length || tagged ops`.
pub fn encode_ops<T: NetState>(ops: &[SyncOp<T>]) -> Vec<u8> {
    let mut body = NetWriter::new();
    for op in ops {
        match op {
            SyncOp::Update {
                index,
                dirty,
                element,
            } => {
                body.write_u8(OP_UPDATE);
                body.write_u16(*index);
                element.write_delta(&mut body, *dirty);
            }
            SyncOp::PushBack(element) => {
                body.write_u8(OP_PUSH_BACK);
                element.write_full(&mut body);
            }
            SyncOp::PopBack => body.write_u8(OP_POP_BACK),
            SyncOp::Insert { index, element } => {
                body.write_u8(OP_INSERT);
                body.write_u16(*index);
                element.write_full(&mut body);
            }
            SyncOp::Erase { index } => {
                body.write_u8(OP_ERASE);
                body.write_u16(*index);
            }
            SyncOp::Clear => body.write_u8(OP_CLEAR),
            SyncOp::Resize { len } => {
                body.write_u8(OP_RESIZE);
                body.write_u16(*len);
            }
            SyncOp::Replace(items) => {
                body.write_u8(OP_REPLACE);
                write_seq(&mut body, items);
            }
        }
    }

    let body = body.into_vec();
    let mut out = NetWriter::new();
    out.write_u32(body.len() as u32);
    let mut out = out.into_vec();
    out.extend_from_slice(&body);
    out
}

/// Ordered sequence kept structurally identical to its server twin.
#[derive(Debug, Clone, Default)]
pub struct SyncArray<T> {
    items: Vec<T>,
}

impl<T> SyncArray<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Local setup only (offline defaults); synced contents come from
    /// [`SyncArray::read_full`] / [`SyncArray::read_delta`].
    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

impl<T: NetState + Default + Clone> SyncArray<T> {
    /// Reads the sequence initial value, replacing current contents.
    pub fn read_full(&mut self, r: &mut NetReader<'_>) -> Result<(), SerialError> {
        self.items = read_seq(r)?;
        Ok(())
    }

    pub fn write_full(&self, w: &mut NetWriter) {
        write_seq(w, &self.items);
    }

    /// Applies one delta frame.
    ///
    /// Operations are consumed in wire order until the declared byte
    /// length is exhausted. An unrecognized tag is fatal: its payload
    /// length is unknown, so nothing after it can be parsed.
    pub fn read_delta(&mut self, r: &mut NetReader<'_>) -> Result<(), SerialError> {
        let byte_len = r.read_u32()? as usize;
        let frame = r.read_exact(byte_len)?;
        let mut ops = NetReader::new(frame);

        while !ops.is_empty() {
            let tag = ops.read_u8()?;
            match tag {
                OP_UPDATE => {
                    let index = ops.read_u16()? as usize;
                    let len = self.items.len();
                    let element = self
                        .items
                        .get_mut(index)
                        .ok_or(SerialError::IndexOutOfRange { index, len })?;
                    element.read_delta(&mut ops)?;
                }
                OP_PUSH_BACK => {
                    self.items.push(T::read_full(&mut ops)?);
                }
                OP_POP_BACK => {
                    let len = self.items.len();
                    self.items
                        .pop()
                        .ok_or(SerialError::IndexOutOfRange { index: 0, len })?;
                }
                OP_INSERT => {
                    let index = ops.read_u16()? as usize;
                    let element = T::read_full(&mut ops)?;
                    let len = self.items.len();
                    if index > len {
                        return Err(SerialError::IndexOutOfRange { index, len });
                    }
                    self.items.insert(index, element);
                }
                OP_ERASE => {
                    let index = ops.read_u16()? as usize;
                    let len = self.items.len();
                    if index >= len {
                        return Err(SerialError::IndexOutOfRange { index, len });
                    }
                    self.items.remove(index);
                }
                OP_CLEAR => self.items.clear(),
                OP_RESIZE => {
                    let len = ops.read_u16()? as usize;
                    self.items.resize_with(len, T::default);
                }
                OP_REPLACE => {
                    self.items = read_seq(&mut ops)?;
                }
                other => return Err(SerialError::UnknownSyncOp(other)),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    /// Two-field element: `value` is bit 0, `label` is bit 1.
    #[derive(Debug, Clone, Default, PartialEq)]
    struct Item {
        value: i32,
        label: String,
    }

    impl NetState for Item {
        fn read_full(r: &mut NetReader<'_>) -> Result<Self, SerialError> {
            Ok(Self {
                value: r.read_i32()?,
                label: r.read_string()?,
            })
        }

        fn write_full(&self, w: &mut NetWriter) {
            w.write_i32(self.value);
            w.write_string(&self.label);
        }

        fn read_delta(&mut self, r: &mut NetReader<'_>) -> Result<(), SerialError> {
            let dirty = r.read_u8()?;
            if dirty & 1 != 0 {
                self.value = r.read_i32()?;
            }
            if dirty & 2 != 0 {
                self.label = r.read_string()?;
            }
            Ok(())
        }

        fn write_delta(&self, w: &mut NetWriter, dirty: u32) {
            let dirty = dirty as u8;
            w.write_u8(dirty);
            if dirty & 1 != 0 {
                w.write_i32(self.value);
            }
            if dirty & 2 != 0 {
                w.write_string(&self.label);
            }
        }
    }

    fn apply_to_model(model: &mut Vec<Item>, op: &SyncOp<Item>) {
        match op {
            SyncOp::Update {
                index,
                dirty,
                element,
            } => {
                let target = &mut model[*index as usize];
                if dirty & 1 != 0 {
                    target.value = element.value;
                }
                if dirty & 2 != 0 {
                    target.label = element.label.clone();
                }
            }
            SyncOp::PushBack(e) => model.push(e.clone()),
            SyncOp::PopBack => {
                model.pop();
            }
            SyncOp::Insert { index, element } => model.insert(*index as usize, element.clone()),
            SyncOp::Erase { index } => {
                model.remove(*index as usize);
            }
            SyncOp::Clear => model.clear(),
            SyncOp::Resize { len } => model.resize_with(*len as usize, Item::default),
            SyncOp::Replace(items) => *model = items.clone(),
        }
    }

    fn random_op(rng: &mut impl Rng, len: usize) -> SyncOp<Item> {
        let element = || Item {
            value: 1 + (len as i32),
            label: format!("e{len}"),
        };
        loop {
            match rng.gen_range(0..8u8) {
                0 if len > 0 => {
                    return SyncOp::Update {
                        index: rng.gen_range(0..len) as u16,
                        dirty: rng.gen_range(1..4),
                        element: element(),
                    }
                }
                1 => return SyncOp::PushBack(element()),
                2 if len > 0 => return SyncOp::PopBack,
                3 => {
                    return SyncOp::Insert {
                        index: rng.gen_range(0..=len) as u16,
                        element: element(),
                    }
                }
                4 if len > 0 => {
                    return SyncOp::Erase {
                        index: rng.gen_range(0..len) as u16,
                    }
                }
                5 => return SyncOp::Clear,
                6 => {
                    return SyncOp::Resize {
                        len: rng.gen_range(0..6),
                    }
                }
                7 => return SyncOp::Replace(vec![element(); rng.gen_range(0..4)]),
                _ => continue,
            }
        }
    }

    #[test]
    fn full_roundtrip() {
        let mut arr = SyncArray::new();
        arr.push(Item {
            value: 3,
            label: "a".into(),
        });
        arr.push(Item {
            value: 9,
            label: "b".into(),
        });

        let mut w = NetWriter::new();
        arr.write_full(&mut w);
        let buf = w.into_vec();

        let mut back: SyncArray<Item> = SyncArray::new();
        back.read_full(&mut NetReader::new(&buf)).unwrap();
        assert_eq!(back.as_slice(), arr.as_slice());
    }

    /// Random operation sequences drive the codec and a plain `Vec`
    /// reference model; final states must agree for any length.
    #[test]
    fn random_op_sequences_match_reference_model() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);

        for round in 0..100 {
            let mut model: Vec<Item> = Vec::new();
            let mut arr: SyncArray<Item> = SyncArray::new();

            for _ in 0..rng.gen_range(0..20) {
                let op = random_op(&mut rng, model.len());
                apply_to_model(&mut model, &op);

                let frame = encode_ops(std::slice::from_ref(&op));
                arr.read_delta(&mut NetReader::new(&frame)).unwrap();
            }

            assert_eq!(arr.as_slice(), &model[..], "round {round}");
        }
    }

    #[test]
    fn ops_batch_in_one_frame_apply_in_wire_order() {
        let ops = vec![
            SyncOp::PushBack(Item {
                value: 1,
                label: "x".into(),
            }),
            SyncOp::PushBack(Item {
                value: 2,
                label: "y".into(),
            }),
            SyncOp::Erase { index: 0 },
            SyncOp::Update {
                index: 0,
                dirty: 1,
                element: Item {
                    value: 7,
                    label: String::new(),
                },
            },
        ];
        let frame = encode_ops(&ops);

        let mut arr: SyncArray<Item> = SyncArray::new();
        arr.read_delta(&mut NetReader::new(&frame)).unwrap();
        assert_eq!(arr.len(), 1);
        assert_eq!(arr.get(0).unwrap().value, 7);
        assert_eq!(arr.get(0).unwrap().label, "y");
    }

    #[test]
    fn unknown_tag_is_fatal() {
        let mut w = NetWriter::new();
        w.write_u32(1);
        w.write_u8(0xfe);
        let buf = w.into_vec();

        let mut arr: SyncArray<Item> = SyncArray::new();
        let err = arr.read_delta(&mut NetReader::new(&buf)).unwrap_err();
        assert_eq!(err, SerialError::UnknownSyncOp(0xfe));
    }

    #[test]
    fn empty_delta_frame_is_a_noop() {
        let mut w = NetWriter::new();
        w.write_u32(0);
        let buf = w.into_vec();

        let mut arr: SyncArray<Item> = SyncArray::new();
        arr.push(Item::default());
        arr.read_delta(&mut NetReader::new(&buf)).unwrap();
        assert_eq!(arr.len(), 1);
    }
}
