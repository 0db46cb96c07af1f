//! Token embedding lookup.

use pyrope::dtype::read_f32;
use pyrope::tensor::{Tensor, TensorView};
use pyrope::{Error, Result};

/// Copy row `token_id` of a `[vocab, d_model]` embedding table into
/// an F32 `[d_model]` tensor, decoding from the stored dtype.
///
/// # Errors
/// `InvalidShape` for a non-2-D table; `OutOfRange` when the token id
/// is outside the vocabulary.
pub fn embedding_row(table: &TensorView<'_>, token_id: u32) -> Result<Tensor> {
    if table.ndim() != 2 {
        return Err(Error::InvalidShape(format!(
            "embedding table must be [vocab, d_model], got {:?}",
            table.shape()
        )));
    }
    let vocab = table.shape()[0];
    let d_model = table.shape()[1];
    let idx = token_id as usize;
    if idx >= vocab {
        return Err(Error::OutOfRange(format!(
            "token id {token_id} outside vocabulary of {vocab}"
        )));
    }

    let row = table.row(idx);
    let out: Vec<f32> = (0..d_model)
        .map(|i| read_f32(row, table.dtype(), i))
        .collect();
    Ok(Tensor::from_f32(&[d_model], &out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyrope::dtype::DType;

    #[test]
    fn test_embedding_row() {
        #[rustfmt::skip]
        let table = Tensor::from_f32(&[3, 2], &[
            0.0, 0.1,
            1.0, 1.1,
            2.0, 2.1,
        ]);
        let row = embedding_row(&table.view(), 1).unwrap();
        assert_eq!(row.shape(), &[2]);
        assert_eq!(row.as_f32_slice(), &[1.0, 1.1]);
    }

    #[test]
    fn test_embedding_row_f16_table() {
        let values = [0.5f32, -1.5, 2.0, 0.25];
        let bits: Vec<u8> = values
            .iter()
            .flat_map(|&v| half::f16::from_f32(v).to_bits().to_le_bytes())
            .collect();
        let table = Tensor::from_raw(&[2, 2], DType::F16, bits);
        let row = embedding_row(&table.view(), 1).unwrap();
        assert_eq!(row.as_f32_slice(), &[2.0, 0.25]);
    }

    #[test]
    fn test_embedding_row_out_of_range() {
        let table = Tensor::from_f32(&[2, 2], &[0.0; 4]);
        assert!(matches!(
            embedding_row(&table.view(), 2),
            Err(Error::OutOfRange(_))
        ));
    }
}
